// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing and principal authentication.
//!
//! Hashes are Argon2id PHC strings with a fresh random salt. Hashing and
//! verification are CPU-bound, so both run on the blocking pool.

use crate::config::Config;
use crate::db::Store;
use crate::error::Result;
use crate::models::{
    normalize_email, Admin, AnyPrincipal, Principal, PrincipalKind, Provider, Role, User,
};
use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Upper bound for calibrated iterations, so a slow host cannot push
/// request latency into the seconds.
const MAX_CALIBRATED_ITERATIONS: u32 = 16;

/// Input used only to time the hasher.
const CALIBRATION_PROBE: &str = "calibration-probe-password";

/// Secret behind the stand-in hash verified when there is no real one, so
/// unknown emails cost the same as known ones.
const DUMMY_SECRET: &str = "vouchsafe-no-such-principal";

/// Why authentication failed. Never shown to the caller; every variant
/// renders as the same external error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("no principal with this email")]
    UnknownEmail,
    #[error("principal has no password set")]
    NoPassword,
    #[error("password does not match")]
    BadPassword,
    #[error("principal is inactive")]
    Inactive,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl HashingParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: 1,
        }
    }

    fn hasher(&self) -> anyhow::Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Raise the iteration count until one hash takes at least `target` on
    /// this host. Blocking; call it once at startup.
    pub fn calibrate(self, target: Duration) -> anyhow::Result<Self> {
        let mut params = self;
        loop {
            let started = Instant::now();
            hash_with(&params, CALIBRATION_PROBE)?;
            let elapsed = started.elapsed();

            if elapsed >= target || params.iterations >= MAX_CALIBRATED_ITERATIONS {
                tracing::info!(
                    memory_kib = params.memory_kib,
                    iterations = params.iterations,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Argon2 parameters calibrated"
                );
                return Ok(params);
            }
            params.iterations += 1;
        }
    }
}

fn hash_with(params: &HashingParams, secret: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = params
        .hasher()?
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash secret: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify_with(secret: &str, stored: &str) -> bool {
    // Parameters come from the PHC string, so old hashes keep verifying
    // after a cost change.
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Secret supplied for a new user.
#[derive(Clone)]
pub enum NewSecret {
    /// Externally authenticated user, no password.
    None,
    /// Raw password, hashed on write.
    Plain(String),
    /// Hash produced earlier by [`CredentialStore::hash_secret`], e.g. parked
    /// in a signup challenge.
    Hashed(String),
}

/// Fields for creating a user.
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub provider: Provider,
    pub email_verified: bool,
    pub secret: NewSecret,
}

/// Owns every write of `password_hash`.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn Store>,
    params: HashingParams,
    dummy_hash: Arc<OnceCell<String>>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn Store>, params: HashingParams) -> Self {
        Self {
            store,
            params,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn params(&self) -> HashingParams {
        self.params
    }

    /// Hash a secret with a fresh salt.
    pub async fn hash_secret(&self, secret: &str) -> Result<String> {
        let params = self.params;
        let secret = secret.to_owned();
        let hash = tokio::task::spawn_blocking(move || hash_with(&params, &secret))
            .await
            .map_err(|e| anyhow!("hashing task failed: {e}"))??;
        Ok(hash)
    }

    /// Check a secret against a stored hash. A missing or malformed hash
    /// never verifies.
    pub async fn verify_secret(&self, secret: &str, stored: Option<&str>) -> bool {
        let Some(stored) = stored else {
            return false;
        };
        let secret = secret.to_owned();
        let stored = stored.to_owned();
        tokio::task::spawn_blocking(move || verify_with(&secret, &stored))
            .await
            .unwrap_or(false)
    }

    /// Hash with the current parameters that no real secret matches.
    async fn dummy_hash(&self) -> Result<&str> {
        self.dummy_hash
            .get_or_try_init(|| self.hash_secret(DUMMY_SECRET))
            .await
            .map(String::as_str)
    }

    /// Look up a principal of the given kind by email.
    pub async fn find_principal(
        &self,
        kind: PrincipalKind,
        email: &str,
    ) -> Result<Option<AnyPrincipal>> {
        let email = normalize_email(email);
        Ok(match kind {
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
        })
    }

    /// Create a user. Fails with a conflict if the email is taken.
    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let password_hash = match new_user.secret {
            NewSecret::None => None,
            NewSecret::Plain(secret) => Some(self.hash_secret(&secret).await?),
            NewSecret::Hashed(hash) => Some(hash),
        };

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(&new_user.email),
            name: new_user.name.trim().to_string(),
            image: new_user.image,
            password_hash,
            role: Role::User,
            is_active: true,
            email_verified: new_user.email_verified,
            provider: new_user.provider,
            points: 0,
            last_claim_at: None,
            created_at: Utc::now(),
        };

        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, email = %user.email, "User created");
        Ok(user)
    }

    pub async fn create_admin(&self, email: &str, secret: &str) -> Result<Admin> {
        let admin = Admin {
            id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(email),
            password_hash: Some(self.hash_secret(secret).await?),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        };

        self.store.insert_admin(&admin).await?;
        tracing::info!(admin_id = %admin.id, email = %admin.email, "Admin created");
        Ok(admin)
    }

    /// Replace a principal's secret. Returns `false` without writing when
    /// the stored hash already matches `secret`.
    pub async fn update_secret(&self, principal: &AnyPrincipal, secret: &str) -> Result<bool> {
        if self
            .verify_secret(secret, principal.password_hash())
            .await
        {
            tracing::debug!(principal_id = %principal.id(), "Secret unchanged, skipping write");
            return Ok(false);
        }

        let hash = self.hash_secret(secret).await?;
        match principal {
            AnyPrincipal::User(user) => {
                self.store
                    .set_user_password_hash(&user.email, &hash)
                    .await?
            }
            AnyPrincipal::Admin(admin) => {
                self.store
                    .set_admin_password_hash(&admin.email, &hash)
                    .await?
            }
        }

        tracing::info!(
            principal_id = %principal.id(),
            kind = ?principal.kind(),
            "Secret updated"
        );
        Ok(true)
    }

    /// Authenticate by email and password.
    pub async fn authenticate(
        &self,
        kind: PrincipalKind,
        email: &str,
        secret: &str,
    ) -> Result<AnyPrincipal> {
        let principal = self.find_principal(kind, email).await?;

        // Exactly one verification on every path.
        let stored = principal.as_ref().and_then(|p| p.password_hash());
        let verified = match stored {
            Some(hash) => self.verify_secret(secret, Some(hash)).await,
            None => {
                let dummy = self.dummy_hash().await?;
                self.verify_secret(secret, Some(dummy)).await;
                false
            }
        };

        let principal = principal.ok_or(AuthFailure::UnknownEmail)?;
        if principal.password_hash().is_none() {
            return Err(AuthFailure::NoPassword.into());
        }
        if !verified {
            return Err(AuthFailure::BadPassword.into());
        }

        if !principal.is_active() {
            return Err(AuthFailure::Inactive.into());
        }

        Ok(principal)
    }
}
