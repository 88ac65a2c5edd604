// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Out-of-band delivery of codes and links.
//!
//! Actual email/SMS sending happens elsewhere; this service only hands the
//! message to a delivery channel.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    SendFailed(String),

    #[error("Delivery endpoint rejected message with status {0}")]
    Rejected(u16),
}

/// What is being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    SignupCode,
    LoginCode,
    PasswordResetCode,
    EmailVerificationLink,
}

/// A message for one recipient. `secret` is the code or link.
#[derive(Clone, Serialize)]
pub struct Delivery {
    pub destination: String,
    pub kind: DeliveryKind,
    pub secret: String,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("destination", &self.destination)
            .field("kind", &self.kind)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Delivery channel.
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError>;
}

/// Posts deliveries as JSON to a mail relay.
pub struct WebhookMailer {
    http_client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl CodeDelivery for WebhookMailer {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let mut request = self.http_client.post(&self.url).json(delivery);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(
            destination = %delivery.destination,
            kind = ?delivery.kind,
            "Delivery accepted by relay"
        );
        Ok(())
    }
}

/// Logs that a delivery happened, without its secret.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl CodeDelivery for LogMailer {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        tracing::info!(
            destination = %delivery.destination,
            kind = ?delivery.kind,
            "Delivery dispatched (log only)"
        );
        Ok(())
    }
}

/// Keeps deliveries in memory so tests can read the codes back.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Delivery>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent delivery of `kind` to `destination`.
    pub fn last_secret(&self, destination: &str, kind: DeliveryKind) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|d| d.destination == destination && d.kind == kind)
            .map(|d| d.secret.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CodeDelivery for MemoryMailer {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .map_err(|_| DeliveryError::SendFailed("mailbox poisoned".to_string()))?
            .push(delivery.clone());
        Ok(())
    }
}
