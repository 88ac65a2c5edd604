// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie binding.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::OffsetDateTime;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "vouchsafe_session";

/// Attaches and removes the session cookie. Knows nothing about the token.
#[derive(Debug, Clone)]
pub struct SessionCookieManager {
    secure: bool,
    max_age: time::Duration,
}

impl SessionCookieManager {
    pub fn new(secure: bool, session_ttl: chrono::Duration) -> Self {
        Self {
            secure,
            max_age: time::Duration::seconds(session_ttl.num_seconds()),
        }
    }

    fn cookie(&self, value: String, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .max_age(max_age)
            .build()
    }

    pub fn bind(&self, jar: CookieJar, token: String) -> CookieJar {
        jar.add(self.cookie(token, self.max_age))
    }

    /// Overwrite the cookie with an immediately expiring one carrying the
    /// same attributes, so the browser matches and drops it.
    pub fn unbind(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = self.cookie(String::new(), time::Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        jar.add(cookie)
    }
}
