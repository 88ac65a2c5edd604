//! Database layer.
//!
//! [`Store`] is the document-store contract the services depend on.
//! [`FirestoreDb`] backs production; [`MemoryDb`] backs local development
//! and tests.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{Admin, OtpChallenge, OtpPurpose, RedemptionRecord, User, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    /// Users keyed by URL-encoded normalized email
    pub const USERS: &str = "users";
    /// Admins keyed by URL-encoded normalized email
    pub const ADMINS: &str = "admins";
    /// OTP challenges keyed by `{purpose}:{encoded email}`
    pub const OTP_CHALLENGES: &str = "otp_challenges";
    pub const VOUCHERS: &str = "vouchers";
    pub const REDEMPTIONS: &str = "redemptions";
    /// One marker per (user, claim day); creation is the claim guard's lock
    pub const CLAIM_DAYS: &str = "claim_days";
}

/// Document id for a principal, derived from its normalized email.
pub fn email_doc_id(normalized_email: &str) -> String {
    urlencoding::encode(normalized_email).into_owned()
}

/// Document id for the challenge of an (email, purpose) pair.
pub fn challenge_doc_id(normalized_email: &str, purpose: OtpPurpose) -> String {
    format!("{}:{}", purpose.as_str(), email_doc_id(normalized_email))
}

/// Document id for a claim-day marker.
pub fn claim_day_doc_id(user_id: &str, claim_day: &str) -> String {
    format!("{}_{}", user_id, claim_day)
}

/// A conditional claim write.
#[derive(Debug, Clone)]
pub struct ClaimCommit {
    pub user_email: String,
    pub user_id: String,
    /// `last_claim_at` as read before the eligibility decision
    pub expected_last_claim_at: Option<DateTime<Utc>>,
    pub record: RedemptionRecord,
    pub points: i64,
}

/// Outcome of [`Store::commit_claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimWrite {
    Committed,
    /// Another claim won the race; nothing was written.
    Conflict,
}

/// Durable document store.
///
/// Email arguments are expected to be normalized already; implementations
/// key principal documents by them.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Create a user. Fails with [`AppError::Conflict`] if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    async fn set_user_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError>;

    async fn mark_email_verified(&self, email: &str) -> Result<(), AppError>;

    // ─── Admins ──────────────────────────────────────────────────

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>, AppError>;

    async fn insert_admin(&self, admin: &Admin) -> Result<(), AppError>;

    async fn set_admin_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError>;

    async fn record_admin_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    // ─── OTP Challenges ──────────────────────────────────────────

    async fn get_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, AppError>;

    /// Insert or overwrite the challenge for its (email, purpose) pair.
    async fn put_challenge(&self, challenge: &OtpChallenge) -> Result<(), AppError>;

    async fn delete_challenge(&self, email: &str, purpose: OtpPurpose) -> Result<(), AppError>;

    // ─── Vouchers & Claims ───────────────────────────────────────

    async fn get_voucher(&self, voucher_id: &str) -> Result<Option<Voucher>, AppError>;

    /// Append a redemption and update the user's claim state in one
    /// all-or-nothing write, conditional on no other claim having landed.
    async fn commit_claim(&self, commit: &ClaimCommit) -> Result<ClaimWrite, AppError>;

    /// Most recent redemptions first.
    async fn list_redemptions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<RedemptionRecord>, AppError>;
}
