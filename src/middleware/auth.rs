// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session authentication middleware.

use crate::error::AppError;
use crate::models::{AnyPrincipal, Principal, PrincipalKind, Role};
use crate::services::{AuthFailure, SESSION_COOKIE};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Authenticated principal extracted from the session token, with its
/// current stored record.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub principal: AnyPrincipal,
}

/// Middleware that requires a valid session token for a principal that
/// still exists and is active.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)?
    };

    let claims = state.tokens.verify(&token, None).map_err(|e| {
        tracing::debug!(reason = %e, "Session token rejected");
        AppError::InvalidToken
    })?;

    let kind = PrincipalKind::from_is_admin(claims.role == Role::Admin);
    let principal = state
        .credentials
        .find_principal(kind, &claims.email)
        .await?
        .filter(|principal| principal.id() == claims.sub)
        .ok_or_else(|| {
            tracing::debug!(principal_id = %claims.sub, "Session principal no longer exists");
            AppError::InvalidToken
        })?;

    if !principal.is_active() {
        tracing::info!(principal_id = %claims.sub, "Session rejected for inactive principal");
        return Err(AuthFailure::Inactive.into());
    }

    request.extensions_mut().insert(AuthUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        principal,
    });

    Ok(next.run(request).await)
}
