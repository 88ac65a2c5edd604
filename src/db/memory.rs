// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory document store.
//!
//! Used for local development (`STORE_BACKEND=memory`) and tests. Each map
//! entry is guarded by its DashMap shard lock, so the conditional claim
//! write is atomic with respect to other writers of the same user.

use super::{challenge_doc_id, ClaimCommit, ClaimWrite, Store};
use crate::error::AppError;
use crate::models::{Admin, OtpChallenge, OtpPurpose, RedemptionRecord, User, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
struct Collections {
    users: DashMap<String, User>,
    admins: DashMap<String, Admin>,
    challenges: DashMap<String, OtpChallenge>,
    vouchers: DashMap<String, Voucher>,
    /// Redemptions per user id, in claim order
    redemptions: DashMap<String, Vec<RedemptionRecord>>,
}

/// In-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Collections>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a voucher. The catalog is managed outside this
    /// service, so this exists for seeding.
    pub fn upsert_voucher(&self, voucher: Voucher) {
        self.inner.vouchers.insert(voucher.id.clone(), voucher);
    }

    fn not_found(kind: &str, email: &str) -> AppError {
        AppError::NotFound(format!("{} {}", kind, email))
    }
}

#[async_trait]
impl Store for MemoryDb {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.inner.users.get(email).map(|u| u.clone()))
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        match self.inner.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict("email already registered".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn set_user_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError> {
        let mut user = self
            .inner
            .users
            .get_mut(email)
            .ok_or_else(|| Self::not_found("user", email))?;
        user.password_hash = Some(hash.to_string());
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<(), AppError> {
        let mut user = self
            .inner
            .users
            .get_mut(email)
            .ok_or_else(|| Self::not_found("user", email))?;
        user.email_verified = true;
        Ok(())
    }

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>, AppError> {
        Ok(self.inner.admins.get(email).map(|a| a.clone()))
    }

    async fn insert_admin(&self, admin: &Admin) -> Result<(), AppError> {
        match self.inner.admins.entry(admin.email.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict("email already registered".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(admin.clone());
                Ok(())
            }
        }
    }

    async fn set_admin_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError> {
        let mut admin = self
            .inner
            .admins
            .get_mut(email)
            .ok_or_else(|| Self::not_found("admin", email))?;
        admin.password_hash = Some(hash.to_string());
        Ok(())
    }

    async fn record_admin_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut admin = self
            .inner
            .admins
            .get_mut(email)
            .ok_or_else(|| Self::not_found("admin", email))?;
        admin.last_login = Some(at);
        Ok(())
    }

    async fn get_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, AppError> {
        Ok(self
            .inner
            .challenges
            .get(&challenge_doc_id(email, purpose))
            .map(|c| c.clone()))
    }

    async fn put_challenge(&self, challenge: &OtpChallenge) -> Result<(), AppError> {
        self.inner.challenges.insert(
            challenge_doc_id(&challenge.email, challenge.purpose),
            challenge.clone(),
        );
        Ok(())
    }

    async fn delete_challenge(&self, email: &str, purpose: OtpPurpose) -> Result<(), AppError> {
        self.inner
            .challenges
            .remove(&challenge_doc_id(email, purpose));
        Ok(())
    }

    async fn get_voucher(&self, voucher_id: &str) -> Result<Option<Voucher>, AppError> {
        Ok(self.inner.vouchers.get(voucher_id).map(|v| v.clone()))
    }

    async fn commit_claim(&self, commit: &ClaimCommit) -> Result<ClaimWrite, AppError> {
        // Holding the user entry serializes every claim for this user.
        let mut user = self
            .inner
            .users
            .get_mut(&commit.user_email)
            .ok_or_else(|| Self::not_found("user", &commit.user_email))?;

        if user.id != commit.user_id || user.last_claim_at != commit.expected_last_claim_at {
            return Ok(ClaimWrite::Conflict);
        }

        let mut history = self
            .inner
            .redemptions
            .entry(commit.user_id.clone())
            .or_default();

        if history
            .iter()
            .any(|r| r.claim_day == commit.record.claim_day)
        {
            return Ok(ClaimWrite::Conflict);
        }

        history.push(commit.record.clone());
        user.last_claim_at = Some(commit.record.claimed_at);
        user.points += commit.points;

        Ok(ClaimWrite::Committed)
    }

    async fn list_redemptions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<RedemptionRecord>, AppError> {
        Ok(self
            .inner
            .redemptions
            .get(user_id)
            .map(|history| {
                history
                    .iter()
                    .rev()
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
