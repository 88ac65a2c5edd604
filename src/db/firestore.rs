// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users and admins (keyed by normalized email)
//! - OTP challenges (keyed by purpose and email; a TTL policy on
//!   `expires_at` reaps stale records)
//! - Vouchers (read-only here)
//! - Redemptions and claim-day markers (written transactionally)

use super::{
    challenge_doc_id, claim_day_doc_id, collections, email_doc_id, ClaimCommit, ClaimWrite, Store,
};
use crate::error::AppError;
use crate::models::{Admin, OtpChallenge, OtpPurpose, RedemptionRecord, User, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::{paths, FirestoreQueryDirection, FirestoreWritePrecondition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Marker document whose creation claims a (user, day) slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClaimDayMarker {
    user_id: String,
    redemption_id: String,
    claimed_at: DateTime<Utc>,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. Every operation returns a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Add or replace a voucher (seeding and tests).
    pub async fn upsert_voucher(&self, voucher: &Voucher) -> Result<(), AppError> {
        self.put_doc(collections::VOUCHERS, &voucher.id, voucher)
            .await
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn get_doc<T>(&self, collection: &str, doc_id: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_doc<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, doc_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(doc_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create-only insert keyed by email. Firestore rejects creating a
    /// document that already exists, which is what enforces one principal
    /// per (kind, email).
    async fn create_principal_doc<T>(
        &self,
        collection: &str,
        email: &str,
        object: &T,
    ) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let doc_id = email_doc_id(email);
        let result: Result<T, _> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(&doc_id)
            .object(object)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                // Distinguish "already exists" from infrastructure failure.
                if self
                    .get_doc::<serde_json::Value>(collection, &doc_id)
                    .await?
                    .is_some()
                {
                    Err(AppError::Conflict("email already registered".to_string()))
                } else {
                    Err(AppError::Database(e.to_string()))
                }
            }
        }
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, &email_doc_id(email)).await
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        self.create_principal_doc(collections::USERS, &user.email, user)
            .await
    }

    async fn set_user_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError> {
        let mut user = self
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", email)))?;
        user.password_hash = Some(hash.to_string());

        // Field mask: claim state written concurrently must not be clobbered.
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{password_hash}))
            .in_col(collections::USERS)
            .document_id(email_doc_id(email))
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<(), AppError> {
        let mut user = self
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", email)))?;
        user.email_verified = true;

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{email_verified}))
            .in_col(collections::USERS)
            .document_id(email_doc_id(email))
            .object(&user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Admin Operations ────────────────────────────────────────

    async fn find_admin_by_email(&self, email: &str) -> Result<Option<Admin>, AppError> {
        self.get_doc(collections::ADMINS, &email_doc_id(email)).await
    }

    async fn insert_admin(&self, admin: &Admin) -> Result<(), AppError> {
        self.create_principal_doc(collections::ADMINS, &admin.email, admin)
            .await
    }

    async fn set_admin_password_hash(&self, email: &str, hash: &str) -> Result<(), AppError> {
        let mut admin = self
            .find_admin_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", email)))?;
        admin.password_hash = Some(hash.to_string());

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(Admin::{password_hash}))
            .in_col(collections::ADMINS)
            .document_id(email_doc_id(email))
            .object(&admin)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_admin_login(&self, email: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut admin = self
            .find_admin_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("admin {}", email)))?;
        admin.last_login = Some(at);

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(Admin::{last_login}))
            .in_col(collections::ADMINS)
            .document_id(email_doc_id(email))
            .object(&admin)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── OTP Challenge Operations ───────────────────────────────

    async fn get_challenge(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, AppError> {
        self.get_doc(
            collections::OTP_CHALLENGES,
            &challenge_doc_id(email, purpose),
        )
        .await
    }

    async fn put_challenge(&self, challenge: &OtpChallenge) -> Result<(), AppError> {
        self.put_doc(
            collections::OTP_CHALLENGES,
            &challenge_doc_id(&challenge.email, challenge.purpose),
            challenge,
        )
        .await
    }

    async fn delete_challenge(&self, email: &str, purpose: OtpPurpose) -> Result<(), AppError> {
        self.delete_doc(
            collections::OTP_CHALLENGES,
            &challenge_doc_id(email, purpose),
        )
        .await
    }

    // ─── Voucher & Claim Operations ─────────────────────────────

    async fn get_voucher(&self, voucher_id: &str) -> Result<Option<Voucher>, AppError> {
        self.get_doc(collections::VOUCHERS, voucher_id).await
    }

    /// Atomically claim a day: create the claim-day marker, append the
    /// redemption and update the user's claim state in one transaction.
    ///
    /// The marker is written with an `Exists(false)` precondition, so when
    /// two instances race for the same user and day exactly one commit
    /// succeeds and the other transaction fails as a whole.
    async fn commit_claim(&self, commit: &ClaimCommit) -> Result<ClaimWrite, AppError> {
        let client = self.get_client()?;
        let user_doc_id = email_doc_id(&commit.user_email);
        let marker_id = claim_day_doc_id(&commit.user_id, &commit.record.claim_day);

        // 1. Cheap stale-read check before opening a transaction
        let mut user = self
            .find_user_by_email(&commit.user_email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", commit.user_email)))?;

        if user.id != commit.user_id || user.last_claim_at != commit.expected_last_claim_at {
            tracing::debug!(
                user_id = %commit.user_id,
                "Claim state changed since read, rejecting write"
            );
            return Ok(ClaimWrite::Conflict);
        }

        user.last_claim_at = Some(commit.record.claimed_at);
        user.points += commit.points;

        let marker = ClaimDayMarker {
            user_id: commit.user_id.clone(),
            redemption_id: commit.record.id.clone(),
            claimed_at: commit.record.claimed_at,
        };

        // 2. Begin a transaction
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // 3. Claim-day marker, create-only
        client
            .fluent()
            .update()
            .in_col(collections::CLAIM_DAYS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&marker_id)
            .object(&marker)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add marker to transaction: {}", e))
            })?;

        // 4. Redemption record
        client
            .fluent()
            .update()
            .in_col(collections::REDEMPTIONS)
            .document_id(&commit.record.id)
            .object(&commit.record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add redemption to transaction: {}", e))
            })?;

        // 5. User claim state (field mask leaves the rest untouched)
        client
            .fluent()
            .update()
            .fields(paths!(User::{last_claim_at, points}))
            .in_col(collections::USERS)
            .document_id(&user_doc_id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add user to transaction: {}", e))
            })?;

        // 6. Commit atomically
        if let Err(e) = transaction.commit().await {
            let marker_exists = self
                .get_doc::<ClaimDayMarker>(collections::CLAIM_DAYS, &marker_id)
                .await?
                .is_some();

            if marker_exists {
                tracing::info!(
                    user_id = %commit.user_id,
                    claim_day = %commit.record.claim_day,
                    "Concurrent claim already holds this day"
                );
                return Ok(ClaimWrite::Conflict);
            }

            return Err(AppError::Database(format!(
                "Claim transaction commit failed: {}",
                e
            )));
        }

        tracing::info!(
            user_id = %commit.user_id,
            voucher_id = %commit.record.voucher_id,
            claim_day = %commit.record.claim_day,
            "Claim committed atomically"
        );

        Ok(ClaimWrite::Committed)
    }

    async fn list_redemptions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<RedemptionRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::REDEMPTIONS)
            .filter(|q| q.for_all([q.field("principalId").eq(user_id)]))
            .order_by([("claimedAt", FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
