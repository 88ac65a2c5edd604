// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vouchsafe API Server
//!
//! Sign-in, one-time code verification and daily voucher claims for the
//! voucher-discovery site.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vouchsafe::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryDb, Store},
    services::{CodeDelivery, GoogleIdTokenVerifier, HashingParams, LogMailer, WebhookMailer},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting Vouchsafe API");

    // Initialize the document store
    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    // Argon2 cost, optionally calibrated on this host
    let mut hashing = HashingParams::from_config(&config);
    if let Some(target_ms) = config.argon2_target_ms {
        let target = std::time::Duration::from_millis(target_ms);
        hashing = tokio::task::spawn_blocking(move || hashing.calibrate(target)).await??;
    }

    // Delivery channel for codes and links
    let mailer: Arc<dyn CodeDelivery> = match &config.mail_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering codes through mail webhook");
            Arc::new(WebhookMailer::new(
                url.clone(),
                config.mail_webhook_token.clone(),
            )?)
        }
        None => {
            tracing::warn!("MAIL_WEBHOOK_URL not set; codes are only logged as dispatched");
            Arc::new(LogMailer)
        }
    };

    let google = match &config.google_client_id {
        Some(client_id) => Some(Arc::new(GoogleIdTokenVerifier::new(client_id.clone())?)),
        None => {
            tracing::info!("GOOGLE_CLIENT_ID not set; Google sign-in disabled");
            None
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        hashing,
        mailer,
        google,
    )?);

    // Build router
    let app = vouchsafe::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["vouchsafe=debug", "info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry().with(filter).with(format).init();
}
