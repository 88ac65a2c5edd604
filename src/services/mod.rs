// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod claims;
pub mod credentials;
pub mod google_id;
pub mod identity;
pub mod locks;
pub mod mailer;
pub mod otp;
pub mod session;
pub mod token;

pub use claims::{ClaimError, ClaimGuard, ClaimStatus};
pub use credentials::{AuthFailure, CredentialStore, HashingParams, NewSecret, NewUser};
pub use google_id::{GoogleIdError, GoogleIdTokenVerifier};
pub use identity::{ExternalIdentity, IdentityBridge, SessionDescriptor};
pub use locks::{KeyedGuard, KeyedLocks};
pub use mailer::{CodeDelivery, Delivery, DeliveryKind, LogMailer, MemoryMailer, WebhookMailer};
pub use otp::{ChallengeError, IssuedCode, OtpService};
pub use session::{SessionCookieManager, SESSION_COOKIE};
pub use token::{TokenClaims, TokenError, TokenPurpose, TokenService};
