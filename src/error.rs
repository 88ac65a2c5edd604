// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::claims::ClaimError;
use crate::services::credentials::AuthFailure;
use crate::services::otp::ChallengeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// Every credential failure renders the same message; the variant
    /// carries the real reason for server-side logs only.
    #[error("Invalid email or password")]
    Authentication(#[from] AuthFailure),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error("No account is linked to this identity")]
    UnknownPrincipal,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Identity provider error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        AppError::BadRequest(format!("invalid field(s): {}", fields.join(", ")))
    }
}

/// JSON error envelope
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_attempts: Option<u32>,
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::Challenge(err) => match err {
                ChallengeError::NoActiveChallenge => (StatusCode::NOT_FOUND, "no_active_challenge"),
                ChallengeError::Expired => (StatusCode::GONE, "challenge_expired"),
                ChallengeError::AttemptsExhausted => (StatusCode::GONE, "attempts_exhausted"),
                ChallengeError::InvalidCode { .. } => (StatusCode::BAD_REQUEST, "invalid_code"),
                ChallengeError::NotVerified => (StatusCode::FORBIDDEN, "challenge_not_verified"),
            },
            AppError::Claim(err) => match err {
                ClaimError::AlreadyClaimedToday => (StatusCode::CONFLICT, "already_claimed_today"),
                ClaimError::VoucherUnavailable => (StatusCode::GONE, "voucher_unavailable"),
                ClaimError::PrincipalInactive => (StatusCode::FORBIDDEN, "principal_inactive"),
            },
            AppError::UnknownPrincipal => (StatusCode::NOT_FOUND, "unknown_principal"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "identity_provider_error"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Authentication(reason) => {
                tracing::warn!(reason = %reason, "Authentication rejected");
                self.to_string()
            }
            AppError::Upstream(msg) => {
                tracing::error!(error = %msg, "Identity provider error");
                "Identity provider unavailable".to_string()
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "Something went wrong".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                "Something went wrong".to_string()
            }
            other => other.to_string(),
        };

        let remaining_attempts = match &self {
            AppError::Challenge(ChallengeError::InvalidCode { remaining }) => Some(*remaining),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code,
            remaining_attempts,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
