// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! `FIRESTORE_EMULATOR_HOST` to point at it. They skip otherwise.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use vouchsafe::db::{ClaimCommit, ClaimWrite, Store};
use vouchsafe::error::AppError;
use vouchsafe::models::{
    OtpChallenge, OtpPurpose, PrincipalKind, Provider, RedemptionRecord, Role, User, Voucher,
};
use vouchsafe::services::ClaimGuard;

mod common;
use common::test_db;

/// Unique email per test run for isolation.
fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, uuid::Uuid::new_v4().simple())
}

fn test_user(email: &str) -> User {
    User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        name: "Test Shopper".to_string(),
        image: None,
        password_hash: Some("$argon2id$placeholder".to_string()),
        role: Role::User,
        is_active: true,
        email_verified: false,
        provider: Provider::Credentials,
        points: 0,
        last_claim_at: None,
        created_at: Utc::now(),
    }
}

fn test_voucher() -> Voucher {
    Voucher {
        id: format!("v-{}", uuid::Uuid::new_v4().simple()),
        title: "Free Coffee".to_string(),
        code: Some("BREW".to_string()),
        is_active: true,
        starts_at: None,
        expires_at: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PRINCIPAL TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_user_insert_is_create_only() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("create");
    let user = test_user(&email);

    assert!(db.find_user_by_email(&email).await.unwrap().is_none());
    db.insert_user(&user).await.unwrap();

    let fetched = db.find_user_by_email(&email).await.unwrap().unwrap();
    assert_eq!(fetched.id, user.id);
    assert_eq!(fetched.name, "Test Shopper");

    let duplicate = db.insert_user(&test_user(&email)).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_field_updates_leave_claim_state_alone() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("fields");
    let mut user = test_user(&email);
    user.points = 30;
    db.insert_user(&user).await.unwrap();

    db.set_user_password_hash(&email, "$argon2id$new").await.unwrap();
    db.mark_email_verified(&email).await.unwrap();

    let fetched = db.find_user_by_email(&email).await.unwrap().unwrap();
    assert_eq!(fetched.password_hash.as_deref(), Some("$argon2id$new"));
    assert!(fetched.email_verified);
    assert_eq!(fetched.points, 30);
}

// ═══════════════════════════════════════════════════════════════════════════
// CHALLENGE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_challenge_put_overwrites_and_deletes() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("otp");
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let mut challenge = OtpChallenge {
        email: email.clone(),
        purpose: OtpPurpose::PasswordReset,
        principal_kind: PrincipalKind::User,
        code_hash: "aa".repeat(32),
        attempts: 0,
        max_attempts: 3,
        verified: false,
        expires_at: now + Duration::minutes(10),
        created_at: now,
        pending_user: None,
    };
    db.put_challenge(&challenge).await.unwrap();

    challenge.attempts = 2;
    db.put_challenge(&challenge).await.unwrap();

    let fetched = db
        .get_challenge(&email, OtpPurpose::PasswordReset)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.attempts, 2);
    assert_eq!(fetched.expires_at, challenge.expires_at);

    // Purposes are separate slots.
    assert!(db
        .get_challenge(&email, OtpPurpose::Login)
        .await
        .unwrap()
        .is_none());

    db.delete_challenge(&email, OtpPurpose::PasswordReset)
        .await
        .unwrap();
    assert!(db
        .get_challenge(&email, OtpPurpose::PasswordReset)
        .await
        .unwrap()
        .is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// CLAIM TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_commit_claim_is_once_per_day() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("claim");
    let user = test_user(&email);
    db.insert_user(&user).await.unwrap();

    let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let commit = |id: &str| ClaimCommit {
        user_email: email.clone(),
        user_id: user.id.clone(),
        expected_last_claim_at: None,
        record: RedemptionRecord {
            id: id.to_string(),
            principal_id: user.id.clone(),
            voucher_id: "v1".to_string(),
            claimed_at: at,
            claim_day: "2026-03-01".to_string(),
            code: None,
            expires_at: None,
        },
        points: 10,
    };

    assert_eq!(
        db.commit_claim(&commit("r1")).await.unwrap(),
        ClaimWrite::Committed
    );
    assert_eq!(
        db.commit_claim(&commit("r2")).await.unwrap(),
        ClaimWrite::Conflict
    );

    let fetched = db.find_user_by_email(&email).await.unwrap().unwrap();
    assert_eq!(fetched.points, 10);
    assert_eq!(fetched.last_claim_at, Some(at));

    let history = db.list_redemptions(&user.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, "r1");
}

#[tokio::test]
async fn test_concurrent_claims_across_guards() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("race");
    let user = test_user(&email);
    db.insert_user(&user).await.unwrap();
    let voucher = test_voucher();
    db.upsert_voucher(&voucher).await.unwrap();

    // Separate guards have separate in-process locks, like separate instances.
    let store: Arc<dyn Store> = Arc::new(db.clone());
    let now = Utc::now();
    let mut handles = vec![];
    for _ in 0..4 {
        let guard = ClaimGuard::new(store.clone(), 0, 10).unwrap();
        let (user_id, email, voucher_id) = (user.id.clone(), email.clone(), voucher.id.clone());
        handles.push(tokio::spawn(async move {
            guard.claim(&user_id, &email, &voucher_id, now).await
        }));
    }

    let mut won = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            won += 1;
        }
    }
    assert_eq!(won, 1);

    let fetched = db.find_user_by_email(&email).await.unwrap().unwrap();
    assert_eq!(fetched.points, 10);
    assert_eq!(db.list_redemptions(&user.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_redemptions_newest_first() {
    require_emulator!();

    let db = test_db().await;
    let email = unique_email("history");
    let user = test_user(&email);
    db.insert_user(&user).await.unwrap();

    let mut last = None;
    for day in 1..=3 {
        let at = Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap();
        let commit = ClaimCommit {
            user_email: email.clone(),
            user_id: user.id.clone(),
            expected_last_claim_at: last,
            record: RedemptionRecord {
                id: format!("r{day}"),
                principal_id: user.id.clone(),
                voucher_id: "v1".to_string(),
                claimed_at: at,
                claim_day: at.format("%Y-%m-%d").to_string(),
                code: None,
                expires_at: None,
            },
            points: 10,
        };
        assert_eq!(db.commit_claim(&commit).await.unwrap(), ClaimWrite::Committed);
        last = Some(at);
    }

    let history = db.list_redemptions(&user.id, 2).await.unwrap();
    let ids: Vec<_> = history.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["r3", "r2"]);
}
