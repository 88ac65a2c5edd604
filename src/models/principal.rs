// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Principal models: end users and administrators.
//!
//! Users and admins live in separate collections and never share an
//! identity space, even when their email addresses coincide.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize an email address for storage and lookup.
///
/// Every write and every lookup goes through this, which makes email
/// matching case-insensitive and whitespace-tolerant.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Role carried in session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Which principal store a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    #[default]
    User,
    Admin,
}

impl PrincipalKind {
    pub fn from_is_admin(is_admin: bool) -> Self {
        if is_admin {
            PrincipalKind::Admin
        } else {
            PrincipalKind::User
        }
    }
}

/// How a user first authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Credentials,
    Google,
}

/// Capabilities shared by every kind of principal.
pub trait Principal {
    fn id(&self) -> &str;
    fn email(&self) -> &str;
    fn role(&self) -> Role;
    fn is_active(&self) -> bool;
    /// Stored Argon2 PHC string, absent for externally authenticated users.
    fn password_hash(&self) -> Option<&str>;
    fn kind(&self) -> PrincipalKind;
}

/// End user stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique identifier (UUIDv4)
    pub id: String,
    /// Normalized email (also the document key)
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_active: bool,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub provider: Provider,
    /// Reward points, owned by the claim guard
    #[serde(default)]
    pub points: i64,
    /// Time of the most recent voucher claim, owned by the claim guard
    #[serde(default)]
    pub last_claim_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Principal for User {
    fn id(&self) -> &str {
        &self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
    fn role(&self) -> Role {
        self.role
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }
    fn kind(&self) -> PrincipalKind {
        PrincipalKind::User
    }
}

/// Administrator stored in Firestore. The role is always [`Role::Admin`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Principal for Admin {
    fn id(&self) -> &str {
        &self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
    fn role(&self) -> Role {
        Role::Admin
    }
    fn is_active(&self) -> bool {
        self.is_active
    }
    fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }
    fn kind(&self) -> PrincipalKind {
        PrincipalKind::Admin
    }
}

/// A principal of either kind.
#[derive(Debug, Clone)]
pub enum AnyPrincipal {
    User(User),
    Admin(Admin),
}

impl AnyPrincipal {
    fn inner(&self) -> &dyn Principal {
        match self {
            AnyPrincipal::User(user) => user,
            AnyPrincipal::Admin(admin) => admin,
        }
    }

    /// Display name used in session descriptors.
    pub fn display_name(&self) -> String {
        match self {
            AnyPrincipal::User(user) => user.name.clone(),
            AnyPrincipal::Admin(_) => "Administrator".to_string(),
        }
    }
}

impl Principal for AnyPrincipal {
    fn id(&self) -> &str {
        self.inner().id()
    }
    fn email(&self) -> &str {
        self.inner().email()
    }
    fn role(&self) -> Role {
        self.inner().role()
    }
    fn is_active(&self) -> bool {
        self.inner().is_active()
    }
    fn password_hash(&self) -> Option<&str> {
        self.inner().password_hash()
    }
    fn kind(&self) -> PrincipalKind {
        self.inner().kind()
    }
}
