// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One-time code challenges.
//!
//! A challenge moves from pending to verified on a correct code, or is
//! deleted when it expires or runs out of attempts. At most one challenge
//! exists per (email, purpose); requesting a new code replaces it.
//!
//! Every read-check-write on a challenge runs under a per-(email, purpose)
//! lock, so concurrent guesses cannot both observe the same attempt count.

use crate::db::{challenge_doc_id, Store};
use crate::error::{AppError, Result};
use crate::models::{
    normalize_email, AnyPrincipal, OtpChallenge, OtpPurpose, PendingUser, Principal,
    PrincipalKind,
};
use crate::services::credentials::AuthFailure;
use crate::services::locks::{KeyedGuard, KeyedLocks};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Challenge state failures, surfaced to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("No active verification code. Please request a new one.")]
    NoActiveChallenge,
    #[error("Verification code has expired. Please request a new one.")]
    Expired,
    #[error("Too many failed attempts. Please request a new code.")]
    AttemptsExhausted,
    #[error("Invalid verification code")]
    InvalidCode { remaining: u32 },
    #[error("Verification code has not been confirmed")]
    NotVerified,
}

/// A freshly issued code. The raw code exists only here, for delivery.
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCode")
            .field("code", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Generate a uniformly random 6-digit code without a leading zero.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    let code: u32 = rng.random_range(100_000..1_000_000);
    code.to_string()
}

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn Store>,
    hmac_key: Arc<Vec<u8>>,
    ttl: Duration,
    max_attempts: u32,
    locks: KeyedLocks,
}

impl OtpService {
    pub fn new(store: Arc<dyn Store>, hmac_key: &[u8], ttl: Duration, max_attempts: u32) -> Self {
        Self {
            store,
            hmac_key: Arc::new(hmac_key.to_vec()),
            ttl,
            max_attempts,
            locks: KeyedLocks::new(),
        }
    }

    /// Keyed hash of a code, bound to its purpose and email so a stored
    /// hash cannot be replayed against another challenge.
    fn hash_code(&self, email: &str, purpose: OtpPurpose, code: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.hmac_key)
            .map_err(|e| anyhow::anyhow!("invalid OTP key: {e}"))?;
        mac.update(purpose.as_str().as_bytes());
        mac.update(b":");
        mac.update(email.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn lock_pair(&self, email: &str, purpose: OtpPurpose) -> KeyedGuard {
        self.locks.lock(challenge_doc_id(email, purpose)).await
    }

    pub async fn request(
        &self,
        email: &str,
        purpose: OtpPurpose,
        kind: PrincipalKind,
        pending_user: Option<PendingUser>,
    ) -> Result<IssuedCode> {
        self.request_at(email, purpose, kind, pending_user, Utc::now())
            .await
    }

    /// Issue a new code, replacing any challenge for the same pair.
    pub async fn request_at(
        &self,
        email: &str,
        purpose: OtpPurpose,
        kind: PrincipalKind,
        pending_user: Option<PendingUser>,
        now: DateTime<Utc>,
    ) -> Result<IssuedCode> {
        let email = normalize_email(email);
        let code = generate_code();
        let expires_at = now + self.ttl;

        let challenge = OtpChallenge {
            email: email.clone(),
            purpose,
            principal_kind: kind,
            code_hash: self.hash_code(&email, purpose, &code)?,
            attempts: 0,
            max_attempts: self.max_attempts,
            verified: false,
            expires_at,
            created_at: now,
            pending_user,
        };

        let _guard = self.lock_pair(&email, purpose).await;
        self.store.put_challenge(&challenge).await?;

        tracing::info!(
            email = %email,
            purpose = purpose.as_str(),
            expires_at = %expires_at,
            "Verification code issued"
        );

        Ok(IssuedCode { code, expires_at })
    }

    pub async fn check(&self, email: &str, purpose: OtpPurpose, code: &str) -> Result<()> {
        self.check_at(email, purpose, code, Utc::now()).await
    }

    /// Check a submitted code. On success the challenge is marked verified
    /// and kept until it is consumed.
    pub async fn check_at(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let email = normalize_email(email);
        let _guard = self.lock_pair(&email, purpose).await;

        let mut challenge = self
            .store
            .get_challenge(&email, purpose)
            .await?
            .ok_or(ChallengeError::NoActiveChallenge)?;

        if challenge.is_expired(now) {
            self.store.delete_challenge(&email, purpose).await?;
            tracing::info!(email = %email, purpose = purpose.as_str(), "Challenge expired");
            return Err(ChallengeError::Expired.into());
        }

        if challenge.attempts >= challenge.max_attempts {
            self.store.delete_challenge(&email, purpose).await?;
            return Err(ChallengeError::AttemptsExhausted.into());
        }

        let submitted = self.hash_code(&email, purpose, code.trim())?;
        let matches: bool = submitted
            .as_bytes()
            .ct_eq(challenge.code_hash.as_bytes())
            .into();

        if !matches {
            challenge.attempts += 1;

            if challenge.attempts >= challenge.max_attempts {
                self.store.delete_challenge(&email, purpose).await?;
                tracing::warn!(
                    email = %email,
                    purpose = purpose.as_str(),
                    "Challenge exhausted after failed attempts"
                );
                return Err(ChallengeError::AttemptsExhausted.into());
            }

            self.store.put_challenge(&challenge).await?;
            tracing::info!(
                email = %email,
                purpose = purpose.as_str(),
                attempts = challenge.attempts,
                "Invalid verification code"
            );
            return Err(ChallengeError::InvalidCode {
                remaining: challenge.remaining_attempts(),
            }
            .into());
        }

        challenge.verified = true;
        self.store.put_challenge(&challenge).await?;
        tracing::info!(email = %email, purpose = purpose.as_str(), "Challenge verified");
        Ok(())
    }

    /// Remove a verified, unexpired challenge and return it. Callers hold
    /// the pair's lock.
    async fn take_verified(
        &self,
        email: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge> {
        let challenge = self
            .store
            .get_challenge(email, purpose)
            .await?
            .ok_or(ChallengeError::NoActiveChallenge)?;

        if challenge.is_expired(now) {
            self.store.delete_challenge(email, purpose).await?;
            return Err(ChallengeError::Expired.into());
        }

        if !challenge.verified {
            return Err(ChallengeError::NotVerified.into());
        }

        self.store.delete_challenge(email, purpose).await?;
        Ok(challenge)
    }

    pub async fn consume_verified(&self, email: &str, purpose: OtpPurpose) -> Result<OtpChallenge> {
        self.consume_verified_at(email, purpose, Utc::now()).await
    }

    /// Consume a verified challenge (signup confirmation, passwordless
    /// login). The returned record carries any pending signup data.
    pub async fn consume_verified_at(
        &self,
        email: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge> {
        let email = normalize_email(email);
        let _guard = self.lock_pair(&email, purpose).await;
        self.take_verified(&email, purpose, now).await
    }

    pub async fn consume_for_password_reset(&self, email: &str) -> Result<AnyPrincipal> {
        self.consume_for_password_reset_at(email, Utc::now()).await
    }

    /// Consume a verified password-reset challenge and return the principal
    /// whose secret may now be replaced.
    pub async fn consume_for_password_reset_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<AnyPrincipal> {
        let email = normalize_email(email);
        let purpose = OtpPurpose::PasswordReset;
        let _guard = self.lock_pair(&email, purpose).await;

        let challenge = self.take_verified(&email, purpose, now).await?;

        let principal = match challenge.principal_kind {
            PrincipalKind::User => self
                .store
                .find_user_by_email(&email)
                .await?
                .map(AnyPrincipal::User),
            PrincipalKind::Admin => self
                .store
                .find_admin_by_email(&email)
                .await?
                .map(AnyPrincipal::Admin),
        }
        .ok_or(AppError::UnknownPrincipal)?;

        if !principal.is_active() {
            return Err(AuthFailure::Inactive.into());
        }

        tracing::info!(
            principal_id = %principal.id(),
            "Password reset challenge consumed"
        );
        Ok(principal)
    }
}
