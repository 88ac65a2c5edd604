// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use serde_json::Value;
use std::sync::Arc;
use vouchsafe::config::Config;
use vouchsafe::db::{FirestoreDb, MemoryDb};
use vouchsafe::models::{User, Voucher};
use vouchsafe::routes::create_router;
use vouchsafe::services::{
    GoogleIdTokenVerifier, HashingParams, MemoryMailer, NewSecret, NewUser, SESSION_COOKIE,
};
use vouchsafe::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Everything a test needs to drive the app and inspect its side effects.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryDb>,
    pub mailer: Arc<MemoryMailer>,
}

/// Cheap Argon2 parameters so tests stay fast.
#[allow(dead_code)]
pub fn test_hashing() -> HashingParams {
    HashingParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

/// Create a test app on an in-memory store.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default(), None)
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> TestApp {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with(config, None)
}

#[allow(dead_code)]
pub fn create_test_app_with(
    config: Config,
    google: Option<Arc<GoogleIdTokenVerifier>>,
) -> TestApp {
    let store = Arc::new(MemoryDb::new());
    let mailer = Arc::new(MemoryMailer::new());

    let state = Arc::new(
        AppState::new(config, store.clone(), test_hashing(), mailer.clone(), google)
            .expect("Failed to build app state"),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        mailer,
    }
}

/// Insert an active, verified user with a password.
#[allow(dead_code)]
pub async fn seed_user(app: &TestApp, email: &str, password: &str) -> User {
    app.state
        .credentials
        .create_user(NewUser {
            email: email.to_string(),
            name: "Test Shopper".to_string(),
            image: None,
            provider: Default::default(),
            email_verified: true,
            secret: NewSecret::Plain(password.to_string()),
        })
        .await
        .expect("Failed to seed user")
}

#[allow(dead_code)]
pub fn seed_voucher(app: &TestApp, id: &str) {
    app.store.upsert_voucher(Voucher {
        id: id.to_string(),
        title: format!("Deal {id}"),
        code: Some(format!("CODE-{id}")),
        is_active: true,
        starts_at: None,
        expires_at: None,
    });
}

/// Build a JSON request, optionally carrying a session cookie.
#[allow(dead_code)]
pub fn json_request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    session: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Raw `Set-Cookie` header for the session cookie, if any.
#[allow(dead_code)]
pub fn session_set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(&format!("{SESSION_COOKIE}=")))
        .map(str::to_string)
}

/// Session token value from the response's `Set-Cookie` header.
#[allow(dead_code)]
pub fn session_token(response: &Response<Body>) -> Option<String> {
    session_set_cookie(response).and_then(|cookie| {
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
    })
}

/// Log in through the HTTP API and return the session token.
#[allow(dead_code)]
pub async fn login(app: &TestApp, email: &str, password: &str) -> String {
    use tower::ServiceExt;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/auth/login",
            Some(serde_json::json!({ "email": email, "password": password })),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "login failed");
    session_token(&response).expect("login set no session cookie")
}
