//! One-time code challenge records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PrincipalKind;

/// What a one-time code is for. Each (email, purpose) pair has at most one
/// challenge document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OtpPurpose {
    Signup,
    Login,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::Login => "login",
            OtpPurpose::PasswordReset => "password-reset",
        }
    }
}

/// Profile fields parked in a signup challenge until the code is verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUser {
    pub name: String,
    /// Already hashed; the raw password never reaches the challenge store.
    pub password_hash: String,
}

/// Stored challenge. Only a keyed hash of the code is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub email: String,
    pub purpose: OtpPurpose,
    #[serde(default)]
    pub principal_kind: PrincipalKind,
    /// Hex HMAC-SHA256 of the code
    pub code_hash: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub verified: bool,
    /// Stored as a native timestamp so a Firestore TTL policy can reap it
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pending_user: Option<PendingUser>,
}

impl OtpChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}
