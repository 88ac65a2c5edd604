// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use super::{dispatch, ok, ok_message, Envelope, NoData};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AnyPrincipal, RedemptionRecord, User};
use crate::services::token::EMAIL_VERIFICATION_TTL_HOURS;
use crate::services::{ClaimStatus, DeliveryKind, SessionDescriptor, TokenPurpose};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 100;

/// API routes (require authentication via session token).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/verify-email", post(send_verification_email))
        .route("/api/vouchers/{id}/claim", post(claim_voucher))
        .route("/api/claims/status", get(claim_status))
        .route("/api/claims", get(claim_history))
}

/// The session's user record, rejecting admin sessions.
fn session_user(auth: &AuthUser) -> Result<User> {
    match &auth.principal {
        AnyPrincipal::User(user) => Ok(user.clone()),
        AnyPrincipal::Admin(_) => Err(AppError::BadRequest(
            "This action is only available to user accounts".to_string(),
        )),
    }
}

// ─── Session ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MeResponse {
    pub user: SessionDescriptor,
}

/// Current session descriptor.
async fn get_me(
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Envelope<MeResponse>>> {
    Ok(ok(
        "Session active",
        MeResponse {
            user: SessionDescriptor::from_principal(&auth.principal),
        },
    ))
}

/// Send a link that confirms the user's email address.
async fn send_verification_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Envelope<NoData>>> {
    let user = session_user(&auth)?;

    if user.email_verified {
        return Ok(ok_message("Email is already verified"));
    }

    let token = state.tokens.issue(
        &user,
        Some(TokenPurpose::EmailVerification),
        Duration::hours(EMAIL_VERIFICATION_TTL_HOURS),
    )?;
    let link = format!(
        "{}/verify-email?token={}",
        state.config.frontend_url.trim_end_matches('/'),
        urlencoding::encode(&token)
    );
    dispatch(&state, &user.email, DeliveryKind::EmailVerificationLink, link).await;

    Ok(ok_message("Verification email sent"))
}

// ─── Claims ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ClaimResponse {
    pub redemption: RedemptionRecord,
}

async fn claim_voucher(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(voucher_id): Path<String>,
) -> Result<Json<Envelope<ClaimResponse>>> {
    session_user(&auth)?;

    let redemption = state
        .claims
        .claim(&auth.id, &auth.email, &voucher_id, Utc::now())
        .await?;

    Ok(ok("Voucher claimed", ClaimResponse { redemption }))
}

async fn claim_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Envelope<ClaimStatus>>> {
    let user = session_user(&auth)?;
    Ok(ok("Claim status", state.claims.status(&user, Utc::now())))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub redemptions: Vec<RedemptionRecord>,
}

async fn claim_history(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Envelope<HistoryResponse>>> {
    let user = session_user(&auth)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let redemptions = state.claims.history(&user.id, limit).await?;
    Ok(ok("Redemption history", HistoryResponse { redemptions }))
}

