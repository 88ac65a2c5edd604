// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end one-time code flows over HTTP: signup, passwordless login and
//! password recovery. Codes are read back from the in-memory mailer.

use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use vouchsafe::services::DeliveryKind;

mod common;
use common::{body_json, json_request, login, seed_user, session_token, TestApp};

/// Never issued: generated codes have no leading zero.
const WRONG_CODE: &str = "000000";

async fn post(app: &TestApp, uri: &str, body: serde_json::Value) -> axum::response::Response {
    app.router
        .clone()
        .oneshot(json_request(Method::POST, uri, Some(body), None))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_password_reset_end_to_end() {
    let app = common::create_test_app();
    seed_user(&app, "reset@example.com", "old-password-1").await;

    let response = post(
        &app,
        "/api/auth/forgot-password",
        json!({ "email": "Reset@Example.com" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let code = app
        .mailer
        .last_secret("reset@example.com", DeliveryKind::PasswordResetCode)
        .expect("no reset code delivered");

    // Resetting before the code is confirmed is refused.
    let response = post(
        &app,
        "/api/auth/reset-password",
        json!({ "email": "reset@example.com", "password": "new-password-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post(
        &app,
        "/api/auth/verify-otp",
        json!({ "email": "reset@example.com", "otp": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post(
        &app,
        "/api/auth/reset-password",
        json!({ "email": "reset@example.com", "password": "new-password-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The challenge is single-use.
    let response = post(
        &app,
        "/api/auth/reset-password",
        json!({ "email": "reset@example.com", "password": "another-password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "no_active_challenge");

    let response = post(
        &app,
        "/api/auth/login",
        json!({ "email": "reset@example.com", "password": "old-password-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, "reset@example.com", "new-password-1").await;
}

#[tokio::test]
async fn test_exhaustion_over_http() {
    let app = common::create_test_app();
    seed_user(&app, "guess@example.com", "guess-password").await;

    post(
        &app,
        "/api/auth/forgot-password",
        json!({ "email": "guess@example.com" }),
    )
    .await;
    let code = app
        .mailer
        .last_secret("guess@example.com", DeliveryKind::PasswordResetCode)
        .unwrap();

    for remaining in [2, 1] {
        let response = post(
            &app,
            "/api/auth/verify-otp",
            json!({ "email": "guess@example.com", "otp": WRONG_CODE }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "invalid_code");
        assert_eq!(body["remainingAttempts"], remaining);
    }

    let response = post(
        &app,
        "/api/auth/verify-otp",
        json!({ "email": "guess@example.com", "otp": WRONG_CODE }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_json(response).await["code"], "attempts_exhausted");

    // Even the right code is useless once the challenge is gone.
    let response = post(
        &app,
        "/api/auth/verify-otp",
        json!({ "email": "guess@example.com", "otp": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_new_code_supersedes_old() {
    let app = common::create_test_app();
    seed_user(&app, "twice@example.com", "twice-password").await;

    post(&app, "/api/auth/forgot-password", json!({ "email": "twice@example.com" })).await;
    let first = app
        .mailer
        .last_secret("twice@example.com", DeliveryKind::PasswordResetCode)
        .unwrap();

    // Loop until the second code differs, so the assertion is meaningful.
    let mut second = first.clone();
    while second == first {
        post(&app, "/api/auth/forgot-password", json!({ "email": "twice@example.com" })).await;
        second = app
            .mailer
            .last_secret("twice@example.com", DeliveryKind::PasswordResetCode)
            .unwrap();
    }

    let response = post(
        &app,
        "/api/auth/verify-otp",
        json!({ "email": "twice@example.com", "otp": first }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post(
        &app,
        "/api/auth/verify-otp",
        json!({ "email": "twice@example.com", "otp": second }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_response_is_uniform() {
    let app = common::create_test_app();
    seed_user(&app, "known@example.com", "known-password").await;

    let known = post(&app, "/api/auth/forgot-password", json!({ "email": "known@example.com" })).await;
    let unknown =
        post(&app, "/api/auth/forgot-password", json!({ "email": "nobody@example.com" })).await;

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(body_json(known).await, body_json(unknown).await);

    assert_eq!(app.mailer.count(), 1);
    assert!(app
        .mailer
        .last_secret("nobody@example.com", DeliveryKind::PasswordResetCode)
        .is_none());
}

#[tokio::test]
async fn test_signup_flow_creates_account_after_code() {
    let app = common::create_test_app();

    let response = post(
        &app,
        "/api/auth/signup",
        json!({ "name": "New Shopper", "email": "New@Example.com", "password": "signup-pass-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["expiresAt"].is_string());

    // No account exists until the code is confirmed.
    let response = post(
        &app,
        "/api/auth/login",
        json!({ "email": "new@example.com", "password": "signup-pass-1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let code = app
        .mailer
        .last_secret("new@example.com", DeliveryKind::SignupCode)
        .unwrap();
    let response = post(
        &app,
        "/api/auth/signup/verify",
        json!({ "email": "new@example.com", "otp": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_token(&response).is_some());
    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "new@example.com");
    assert_eq!(body["user"]["name"], "New Shopper");
    assert_eq!(body["user"]["emailVerified"], true);

    login(&app, "new@example.com", "signup-pass-1").await;

    let response = post(
        &app,
        "/api/auth/signup",
        json!({ "name": "Again", "email": "new@example.com", "password": "signup-pass-2" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_passwordless_login() {
    let app = common::create_test_app();
    seed_user(&app, "otp@example.com", "otp-password-1").await;

    let response = post(
        &app,
        "/api/auth/login/otp/request",
        json!({ "email": "otp@example.com" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let code = app
        .mailer
        .last_secret("otp@example.com", DeliveryKind::LoginCode)
        .unwrap();

    // A login code cannot be spent on the reset flow.
    let response = post(
        &app,
        "/api/auth/verify-otp",
        json!({ "email": "otp@example.com", "otp": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post(
        &app,
        "/api/auth/login/otp",
        json!({ "email": "otp@example.com", "otp": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = session_token(&response).unwrap();

    let me = app
        .router
        .clone()
        .oneshot(json_request(Method::GET, "/api/me", None, Some(&token)))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    let response = post(
        &app,
        "/api/auth/login/otp",
        json!({ "email": "otp@example.com", "otp": code }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_code_not_sent_to_unknown_email() {
    let app = common::create_test_app();

    let response = post(
        &app,
        "/api/auth/login/otp/request",
        json!({ "email": "ghost@example.com" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.mailer.count(), 0);
}
