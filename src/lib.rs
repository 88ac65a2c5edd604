// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Vouchsafe: sign-in, one-time codes and daily voucher claims
//!
//! This crate provides the backend API for a voucher-discovery site:
//! password and Google sign-in with cookie sessions, one-time code flows
//! for signup, passwordless login and password recovery, and a guard that
//! allows each user one voucher claim per calendar day.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use chrono::Duration;
use config::Config;
use db::Store;
use services::{
    ClaimGuard, CodeDelivery, CredentialStore, GoogleIdTokenVerifier, HashingParams,
    IdentityBridge, OtpService, SessionCookieManager, TokenService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub credentials: CredentialStore,
    pub tokens: TokenService,
    pub sessions: SessionCookieManager,
    pub otp: OtpService,
    pub bridge: IdentityBridge,
    pub claims: ClaimGuard,
    pub mailer: Arc<dyn CodeDelivery>,
    /// Absent when Google sign-in is not configured
    pub google: Option<Arc<GoogleIdTokenVerifier>>,
}

impl AppState {
    /// Wire the services around a store and delivery channel.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        hashing: HashingParams,
        mailer: Arc<dyn CodeDelivery>,
        google: Option<Arc<GoogleIdTokenVerifier>>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::new(
            &config.jwt_signing_key,
            Duration::hours(config.session_ttl_hours),
        );
        let sessions = SessionCookieManager::new(config.cookies_secure(), tokens.session_ttl());
        let credentials = CredentialStore::new(store.clone(), hashing);
        let otp = OtpService::new(
            store.clone(),
            &config.otp_hmac_key,
            Duration::minutes(config.otp_ttl_minutes),
            config.otp_max_attempts,
        );
        let bridge = IdentityBridge::new(store.clone(), tokens.clone(), sessions.clone());
        let claims = ClaimGuard::new(
            store.clone(),
            config.claim_utc_offset_minutes,
            config.claim_points,
        )?;

        Ok(Self {
            config,
            store,
            credentials,
            tokens,
            sessions,
            otp,
            bridge,
            claims,
            mailer,
            google,
        })
    }
}
