// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in, signup and password recovery routes.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{dispatch, ok, ok_message, Envelope, NoData};
use crate::error::{AppError, Result};
use crate::models::{
    normalize_email, AnyPrincipal, OtpPurpose, PendingUser, Principal, PrincipalKind, Provider,
};
use crate::services::{
    AuthFailure, ChallengeError, DeliveryKind, NewSecret, NewUser, SessionDescriptor, TokenPurpose,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/signup/verify", post(signup_verify))
        .route("/api/auth/login", post(login))
        .route("/api/auth/login/otp/request", post(login_otp_request))
        .route("/api/auth/login/otp", post(login_otp))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/verify-otp", post(verify_otp))
        .route("/api/auth/reset-password", post(reset_password))
        .route("/api/auth/google", post(google_sign_in))
        .route("/api/auth/verify-email", get(verify_email))
}

/// Returned whenever a code may or may not have been sent, so responses
/// do not reveal which emails have accounts.
const CODE_SENT_IF_REGISTERED: &str =
    "If an account exists for this email, a verification code has been sent";

// ─── Request / Response Types ────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub otp: String,
    #[serde(default)]
    pub purpose: Option<OtpPurpose>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSignInRequest {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeIssued {
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SessionPayload {
    pub user: SessionDescriptor,
}

type SessionResponse = (CookieJar, Json<Envelope<SessionPayload>>);

/// Mint a session for `principal` and attach it to the response.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    principal: &AnyPrincipal,
    message: &str,
) -> Result<SessionResponse> {
    let token = state.tokens.issue_session(principal)?;
    let jar = state.sessions.bind(jar, token);
    Ok((
        jar,
        ok(
            message,
            SessionPayload {
                user: SessionDescriptor::from_principal(principal),
            },
        ),
    ))
}

// ─── Signup ──────────────────────────────────────────────────

/// Start signup: park the hashed password in a signup challenge and send
/// a code. The account is created only once the code is confirmed.
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<Envelope<CodeIssued>>> {
    req.validate()?;
    let email = normalize_email(&req.email);

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let pending = PendingUser {
        name: req.name.trim().to_string(),
        password_hash: state.credentials.hash_secret(&req.password).await?,
    };

    let issued = state
        .otp
        .request(&email, OtpPurpose::Signup, PrincipalKind::User, Some(pending))
        .await?;
    dispatch(&state, &email, DeliveryKind::SignupCode, issued.code).await;

    Ok(ok(
        "Verification code sent",
        CodeIssued {
            expires_at: issued.expires_at,
        },
    ))
}

/// Finish signup with the emailed code.
async fn signup_verify(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<CodeRequest>,
) -> Result<SessionResponse> {
    req.validate()?;
    let email = normalize_email(&req.email);

    state.otp.check(&email, OtpPurpose::Signup, &req.otp).await?;
    let challenge = state
        .otp
        .consume_verified(&email, OtpPurpose::Signup)
        .await?;
    let pending = challenge
        .pending_user
        .ok_or(ChallengeError::NoActiveChallenge)?;

    let user = state
        .credentials
        .create_user(NewUser {
            email,
            name: pending.name,
            image: None,
            provider: Provider::Credentials,
            email_verified: true,
            secret: NewSecret::Hashed(pending.password_hash),
        })
        .await?;

    start_session(&state, jar, &AnyPrincipal::User(user), "Account created")
}

// ─── Password Login ──────────────────────────────────────────

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<SessionResponse> {
    req.validate()?;
    let kind = PrincipalKind::from_is_admin(req.is_admin);

    let principal = state
        .credentials
        .authenticate(kind, &req.email, &req.password)
        .await?;

    if let AnyPrincipal::Admin(admin) = &principal {
        state.store.record_admin_login(&admin.email, Utc::now()).await?;
    }

    tracing::info!(principal_id = %principal.id(), kind = ?kind, "Login succeeded");
    start_session(&state, jar, &principal, "Logged in")
}

// ─── Passwordless Login ──────────────────────────────────────

async fn login_otp_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<Envelope<NoData>>> {
    req.validate()?;
    let email = normalize_email(&req.email);

    match state.store.find_user_by_email(&email).await? {
        Some(user) if user.is_active => {
            let issued = state
                .otp
                .request(&email, OtpPurpose::Login, PrincipalKind::User, None)
                .await?;
            dispatch(&state, &email, DeliveryKind::LoginCode, issued.code).await;
        }
        _ => tracing::info!(email = %email, "Login code requested for unknown or inactive user"),
    }

    Ok(ok_message(CODE_SENT_IF_REGISTERED))
}

async fn login_otp(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<CodeRequest>,
) -> Result<SessionResponse> {
    req.validate()?;
    let email = normalize_email(&req.email);

    state.otp.check(&email, OtpPurpose::Login, &req.otp).await?;
    state.otp.consume_verified(&email, OtpPurpose::Login).await?;

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AuthFailure::UnknownEmail)?;
    if !user.is_active {
        return Err(AuthFailure::Inactive.into());
    }

    start_session(&state, jar, &AnyPrincipal::User(user), "Logged in")
}

async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Envelope<NoData>>) {
    (state.sessions.unbind(jar), ok_message("Logged out"))
}

// ─── Password Recovery ───────────────────────────────────────

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<Envelope<NoData>>> {
    req.validate()?;
    let kind = PrincipalKind::from_is_admin(req.is_admin);

    match state.credentials.find_principal(kind, &req.email).await? {
        Some(principal) if principal.is_active() => {
            let email = principal.email().to_string();
            let issued = state
                .otp
                .request(&email, OtpPurpose::PasswordReset, kind, None)
                .await?;
            dispatch(&state, &email, DeliveryKind::PasswordResetCode, issued.code).await;
        }
        _ => tracing::info!(
            email = %normalize_email(&req.email),
            kind = ?kind,
            "Password reset requested for unknown or inactive principal"
        ),
    }

    Ok(ok_message(CODE_SENT_IF_REGISTERED))
}

async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<Envelope<NoData>>> {
    req.validate()?;
    let purpose = req.purpose.unwrap_or(OtpPurpose::PasswordReset);

    state.otp.check(&req.email, purpose, &req.otp).await?;
    Ok(ok_message("Code verified"))
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<Envelope<NoData>>> {
    req.validate()?;

    let principal = state.otp.consume_for_password_reset(&req.email).await?;
    state
        .credentials
        .update_secret(&principal, &req.password)
        .await?;

    Ok(ok_message("Password has been reset"))
}

// ─── External Identity ───────────────────────────────────────

async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<GoogleSignInRequest>,
) -> Result<SessionResponse> {
    let verifier = state
        .google
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not enabled".to_string()))?;

    let identity = verifier.verify(&req.id_token).await?;
    let (jar, user) = state.bridge.reconcile(jar, identity).await?;

    Ok((jar, ok("Logged in", SessionPayload { user })))
}

// ─── Email Verification ──────────────────────────────────────

async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<Envelope<NoData>>> {
    let claims = state
        .tokens
        .verify(&query.token, Some(TokenPurpose::EmailVerification))
        .map_err(|e| {
            tracing::debug!(reason = %e, "Email verification token rejected");
            AppError::InvalidToken
        })?;

    // The link must still refer to the same account.
    state
        .store
        .find_user_by_email(&claims.email)
        .await?
        .filter(|user| user.id == claims.sub)
        .ok_or(AppError::UnknownPrincipal)?;

    state.store.mark_email_verified(&claims.email).await?;
    tracing::info!(user_id = %claims.sub, "Email verified");

    Ok(ok_message("Email verified"))
}
