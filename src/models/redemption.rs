// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vouchers and redemption history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Voucher as seen by the claim guard. Catalog management lives elsewhere;
/// only the fields that gate a claim are modelled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: String,
    pub title: String,
    /// Redemption code handed to the user on claim
    #[serde(default)]
    pub code: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Voucher {
    /// Whether the voucher can be claimed at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return false;
        }
        !self.expires_at.is_some_and(|end| now >= end)
    }
}

/// One claim event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRecord {
    pub id: String,
    pub principal_id: String,
    pub voucher_id: String,
    pub claimed_at: DateTime<Utc>,
    /// Calendar day of the claim (`YYYY-MM-DD`) in the claim calendar
    pub claim_day: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
