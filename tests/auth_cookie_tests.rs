// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie attribute tests.
//!
//! These tests verify the attributes of the session cookie set on login and
//! that the removal cookie on logout carries the same attributes, for both
//! localhost and production-style frontends.

use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{json_request, seed_user, session_set_cookie};

async fn login_cookie(frontend_url: &str) -> String {
    let app = common::create_test_app_with_frontend_url(frontend_url);
    seed_user(&app, "cookie@example.com", "cookie-password").await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "cookie@example.com", "password": "cookie-password" })),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    session_set_cookie(&response).expect("missing session cookie")
}

async fn logout_cookie(frontend_url: &str) -> String {
    let app = common::create_test_app_with_frontend_url(frontend_url);

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/logout",
            None,
            Some("stale-token"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    session_set_cookie(&response).expect("missing removal cookie")
}

#[tokio::test]
async fn test_login_cookie_localhost_attributes() {
    let cookie = login_cookie("http://localhost:5173").await;

    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=21600"));
    assert!(!cookie.contains("Secure"));
    assert!(!cookie.contains("Domain="));
}

#[tokio::test]
async fn test_login_cookie_production_attributes() {
    let cookie = login_cookie("https://deals.example.com").await;

    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=21600"));
}

#[tokio::test]
async fn test_logout_cookie_removal_matches_creation() {
    for (frontend, secure) in [
        ("http://localhost:5173", false),
        ("https://deals.example.com", true),
    ] {
        let cookie = logout_cookie(frontend).await;

        assert!(cookie.starts_with("vouchsafe_session=;"), "{cookie}");
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(cookie.contains("Secure"), secure, "{cookie}");
    }
}

#[tokio::test]
async fn test_failed_login_sets_no_cookie() {
    let app = common::create_test_app();
    seed_user(&app, "cookie@example.com", "cookie-password").await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "cookie@example.com", "password": "wrong-password" })),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_set_cookie(&response).is_none());
}
