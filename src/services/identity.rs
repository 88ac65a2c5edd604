// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bridge from externally asserted identities to internal sessions.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{normalize_email, AnyPrincipal, Principal, Role};
use crate::services::credentials::AuthFailure;
use crate::services::session::SessionCookieManager;
use crate::services::token::TokenService;
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Identity asserted by an external provider.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// What the client learns about its session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionDescriptor {
    pub id: String,
    pub name: String,
    pub email: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "\"user\" | \"admin\""))]
    pub role: Role,
    pub image: Option<String>,
    pub email_verified: bool,
}

impl SessionDescriptor {
    pub fn from_principal(principal: &AnyPrincipal) -> Self {
        let (image, email_verified) = match principal {
            AnyPrincipal::User(user) => (user.image.clone(), user.email_verified),
            AnyPrincipal::Admin(_) => (None, true),
        };
        Self {
            id: principal.id().to_string(),
            name: principal.display_name(),
            email: principal.email().to_string(),
            role: principal.role(),
            image,
            email_verified,
        }
    }
}

/// Mints internal sessions for users that an external provider vouched for.
/// Users are never created here.
#[derive(Clone)]
pub struct IdentityBridge {
    store: Arc<dyn Store>,
    tokens: TokenService,
    sessions: SessionCookieManager,
}

impl IdentityBridge {
    pub fn new(store: Arc<dyn Store>, tokens: TokenService, sessions: SessionCookieManager) -> Self {
        Self {
            store,
            tokens,
            sessions,
        }
    }

    pub async fn reconcile(
        &self,
        jar: CookieJar,
        identity: ExternalIdentity,
    ) -> Result<(CookieJar, SessionDescriptor)> {
        let email = normalize_email(&identity.email);

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| {
                tracing::info!(email = %email, "External identity has no matching user");
                AppError::UnknownPrincipal
            })?;

        if !user.is_active {
            return Err(AuthFailure::Inactive.into());
        }

        // Internal id and role, never the provider's.
        let principal = AnyPrincipal::User(user);
        let token = self.tokens.issue_session(&principal)?;
        let jar = self.sessions.bind(jar, token);

        tracing::info!(
            user_id = %principal.id(),
            "External identity reconciled"
        );

        Ok((jar, SessionDescriptor::from_principal(&principal)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use crate::models::{Provider, User};
    use crate::services::session::SESSION_COOKIE;
    use chrono::{Duration, Utc};

    fn bridge(store: Arc<MemoryDb>) -> (IdentityBridge, TokenService) {
        let tokens = TokenService::new(b"test_jwt_key_32_bytes_minimum!!", Duration::hours(6));
        let sessions = SessionCookieManager::new(false, Duration::hours(6));
        (IdentityBridge::new(store, tokens.clone(), sessions), tokens)
    }

    fn google_user(email: &str, active: bool) -> User {
        User {
            id: "internal-42".to_string(),
            email: email.to_string(),
            name: "Gina".to_string(),
            image: Some("https://img.example/g.png".to_string()),
            password_hash: None,
            role: Role::User,
            is_active: active,
            email_verified: true,
            provider: Provider::Google,
            points: 0,
            last_claim_at: None,
            created_at: Utc::now(),
        }
    }

    fn identity(email: &str) -> ExternalIdentity {
        ExternalIdentity {
            email: email.to_string(),
            name: Some("Gina G".to_string()),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_known_user_gets_internal_session() {
        let store = Arc::new(MemoryDb::new());
        store
            .insert_user(&google_user("gina@example.com", true))
            .await
            .unwrap();
        let (bridge, tokens) = bridge(store);

        let (jar, descriptor) = bridge
            .reconcile(CookieJar::new(), identity("Gina@Example.com"))
            .await
            .unwrap();

        assert_eq!(descriptor.id, "internal-42");
        assert_eq!(descriptor.name, "Gina");
        let cookie = jar.get(SESSION_COOKIE).unwrap();
        let claims = tokens.verify(cookie.value(), None).unwrap();
        assert_eq!(claims.sub, "internal-42");
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_provisioned() {
        let store = Arc::new(MemoryDb::new());
        let (bridge, _) = bridge(store.clone());

        let err = bridge
            .reconcile(CookieJar::new(), identity("stranger@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownPrincipal));
        assert!(store
            .find_user_by_email("stranger@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected() {
        let store = Arc::new(MemoryDb::new());
        store
            .insert_user(&google_user("off@example.com", false))
            .await
            .unwrap();
        let (bridge, _) = bridge(store);

        let err = bridge
            .reconcile(CookieJar::new(), identity("off@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Authentication(AuthFailure::Inactive)
        ));
    }
}
