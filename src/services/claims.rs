// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily voucher claims.
//!
//! A user may claim at most one voucher per calendar day. Days are counted
//! in a fixed claim calendar (UTC plus a configured offset), independent of
//! server or client locale.
//!
//! Within one instance, claims for the same user are serialized by a
//! per-user lock. Across instances the store write itself is conditional,
//! so a race that slips past the eligibility check still commits only once.

use crate::db::{ClaimCommit, ClaimWrite, Store};
use crate::error::{AppError, Result};
use crate::models::{normalize_email, RedemptionRecord, User};
use crate::services::locks::KeyedLocks;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("You have already claimed a voucher today")]
    AlreadyClaimedToday,
    #[error("This voucher is not available")]
    VoucherUnavailable,
    #[error("Account is inactive")]
    PrincipalInactive,
}

/// Claim eligibility for the current day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ClaimStatus {
    pub eligible: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub last_claim_at: Option<DateTime<Utc>>,
    /// Start of the next claim day, when not eligible now
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub points: i64,
}

#[derive(Clone)]
pub struct ClaimGuard {
    store: Arc<dyn Store>,
    calendar: FixedOffset,
    points_per_claim: i64,
    locks: KeyedLocks,
}

impl ClaimGuard {
    pub fn new(
        store: Arc<dyn Store>,
        utc_offset_minutes: i32,
        points_per_claim: i64,
    ) -> anyhow::Result<Self> {
        let calendar = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!("claim calendar offset out of range: {utc_offset_minutes} minutes")
        })?;

        Ok(Self {
            store,
            calendar,
            points_per_claim,
            locks: KeyedLocks::new(),
        })
    }

    /// Calendar day of an instant in the claim calendar.
    pub fn claim_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.calendar).date_naive()
    }

    pub fn eligible_today(&self, user: &User, now: DateTime<Utc>) -> bool {
        match user.last_claim_at {
            None => true,
            Some(last) => self.claim_day(last) < self.claim_day(now),
        }
    }

    /// First instant of the claim day after the one containing `now`.
    pub fn next_day_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.claim_day(now)
            .succ_opt()?
            .and_hms_opt(0, 0, 0)?
            .and_local_timezone(self.calendar)
            .single()
            .map(|start| start.with_timezone(&Utc))
    }

    pub fn status(&self, user: &User, now: DateTime<Utc>) -> ClaimStatus {
        let eligible = self.eligible_today(user, now);
        ClaimStatus {
            eligible,
            last_claim_at: user.last_claim_at,
            next_eligible_at: if eligible {
                None
            } else {
                self.next_day_start(now)
            },
            points: user.points,
        }
    }

    /// Claim a voucher for the session user identified by `user_id` and
    /// `user_email`.
    pub async fn claim(
        &self,
        user_id: &str,
        user_email: &str,
        voucher_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RedemptionRecord> {
        let email = normalize_email(user_email);

        let _guard = self.locks.lock(email.clone()).await;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .filter(|user| user.id == user_id)
            .ok_or(AppError::UnknownPrincipal)?;

        if !user.is_active {
            return Err(ClaimError::PrincipalInactive.into());
        }

        let voucher = self
            .store
            .get_voucher(voucher_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("voucher {}", voucher_id)))?;

        if !voucher.is_available(now) {
            return Err(ClaimError::VoucherUnavailable.into());
        }

        if !self.eligible_today(&user, now) {
            tracing::debug!(user_id = %user.id, "Claim rejected, already claimed today");
            return Err(ClaimError::AlreadyClaimedToday.into());
        }

        let record = RedemptionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            principal_id: user.id.clone(),
            voucher_id: voucher.id.clone(),
            claimed_at: now,
            claim_day: self.claim_day(now).format("%Y-%m-%d").to_string(),
            code: voucher.code.clone(),
            expires_at: voucher.expires_at,
        };

        let commit = ClaimCommit {
            user_email: email,
            user_id: user.id.clone(),
            expected_last_claim_at: user.last_claim_at,
            record,
            points: self.points_per_claim,
        };

        match self.store.commit_claim(&commit).await? {
            ClaimWrite::Committed => {
                tracing::info!(
                    user_id = %commit.user_id,
                    voucher_id = %commit.record.voucher_id,
                    claim_day = %commit.record.claim_day,
                    "Voucher claimed"
                );
                Ok(commit.record)
            }
            ClaimWrite::Conflict => Err(ClaimError::AlreadyClaimedToday.into()),
        }
    }

    /// Redemption history, newest first.
    pub async fn history(&self, user_id: &str, limit: u32) -> Result<Vec<RedemptionRecord>> {
        self.store.list_redemptions(user_id, limit).await
    }
}
