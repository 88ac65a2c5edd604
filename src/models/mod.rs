// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod otp;
pub mod principal;
pub mod redemption;

pub use otp::{OtpChallenge, OtpPurpose, PendingUser};
pub use principal::{
    normalize_email, Admin, AnyPrincipal, Principal, PrincipalKind, Provider, Role, User,
};
pub use redemption::{RedemptionRecord, Voucher};
