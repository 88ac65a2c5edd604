// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed session tokens.

use crate::models::{Principal, Role};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

/// Lifetime of email verification links.
pub const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;

/// Purpose tag for tokens that are not sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Absent for session tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<TokenPurpose>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token purpose does not match")]
    WrongPurpose,
}

/// Issues and verifies HS256 tokens with the process-wide signing key.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("signing_key", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

impl TokenService {
    pub fn new(signing_key: &[u8], session_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Issue a token for `subject` valid for `ttl` from now.
    pub fn issue(
        &self,
        subject: &dyn Principal,
        purpose: Option<TokenPurpose>,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        self.issue_at(subject, purpose, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &dyn Principal,
        purpose: Option<TokenPurpose>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let iat = now.timestamp();
        let claims = TokenClaims {
            sub: subject.id().to_string(),
            email: subject.email().to_string(),
            role: subject.role(),
            purpose,
            iat,
            exp: iat + ttl.num_seconds(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Issue a session token with the configured session lifetime.
    pub fn issue_session(&self, subject: &dyn Principal) -> anyhow::Result<String> {
        self.issue(subject, None, self.session_ttl)
    }

    /// Verify a token. `purpose` must match exactly: `None` accepts only
    /// session tokens.
    pub fn verify(
        &self,
        token: &str,
        purpose: Option<TokenPurpose>,
    ) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, purpose, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        purpose: Option<TokenPurpose>,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        // Expiry is checked below against `now`, without leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        if claims.purpose != purpose {
            return Err(TokenError::WrongPurpose);
        }

        Ok(claims)
    }
}
