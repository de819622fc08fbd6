// ABOUTME: Single-use, short-lived authorization code store for the Authorization Code grant
// ABOUTME: Consumption is atomic so one code can never be exchanged twice under concurrent requests
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use super::codes::{random_code, WIDE_CHARSET};
use crate::errors::AppResult;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Length of generated authorization codes
pub const AUTH_CODE_LEN: usize = 32;

/// Lifecycle state of an authorization code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCodeState {
    /// Issued, not yet exchanged
    Pending,
    /// Exchanged for a bearer token; any further use must fail
    Complete,
}

/// An issued authorization code and the context it was bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    /// The opaque, unguessable code value
    pub code: String,
    /// User who consented
    pub user_id: i64,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI the code was issued for; exchange must repeat it exactly
    pub redirect_uri: String,
    /// Granted scope, already filtered against the client's allowlist
    pub scope: String,
    /// Address of the consenting request
    pub requester_ip: String,
    /// Issue time plus the code TTL
    pub expires_at: DateTime<Utc>,
    /// Pending until exchanged, then complete
    pub state: AuthCodeState,
}

/// Why an authorization code lookup failed
///
/// Three distinct kinds rather than a boolean: callers react differently
/// to a code that never existed, one that timed out, and one being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthCodeError {
    #[error("auth code not found")]
    NotFound,
    #[error("auth code has expired")]
    Expired,
    #[error("auth code has already been used")]
    AlreadyUsed,
}

/// In-memory store of pending authorization codes
pub struct AuthorizationCodeStore {
    codes: Mutex<HashMap<String, AuthorizationCode>>,
    ttl: Duration,
}

impl AuthorizationCodeStore {
    /// Create a store whose codes live for `ttl_seconds`
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AuthorizationCode>> {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a new code bound to the given user, client, redirect URI and scope
    ///
    /// # Errors
    /// Returns an error if the system RNG fails
    pub fn new_code(
        &self,
        user_id: i64,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        requester_ip: &str,
        now: DateTime<Utc>,
    ) -> AppResult<AuthorizationCode> {
        let code = AuthorizationCode {
            code: random_code(WIDE_CHARSET, AUTH_CODE_LEN)?,
            user_id,
            client_id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            scope: scope.to_owned(),
            requester_ip: requester_ip.to_owned(),
            expires_at: now + self.ttl,
            state: AuthCodeState::Pending,
        };
        self.lock().insert(code.code.clone(), code.clone());
        Ok(code)
    }

    /// Look up a code without consuming it
    ///
    /// # Errors
    /// `NotFound`, `Expired`, or `AlreadyUsed` depending on what the caller hit
    pub fn get(&self, code: &str, now: DateTime<Utc>) -> Result<AuthorizationCode, AuthCodeError> {
        let store = self.lock();
        let entry = store.get(code).ok_or(AuthCodeError::NotFound)?;
        if now >= entry.expires_at {
            return Err(AuthCodeError::Expired);
        }
        if entry.state == AuthCodeState::Complete {
            return Err(AuthCodeError::AlreadyUsed);
        }
        Ok(entry.clone())
    }

    /// Atomically look up a code and mark it complete
    ///
    /// Lookup and transition happen in one critical section, so two
    /// concurrent exchanges racing on the same code cannot both succeed:
    /// the loser sees `AlreadyUsed`.
    ///
    /// # Errors
    /// `NotFound`, `Expired`, or `AlreadyUsed` depending on what the caller hit
    pub fn consume(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCode, AuthCodeError> {
        let mut store = self.lock();
        let entry = store.get_mut(code).ok_or(AuthCodeError::NotFound)?;
        if now >= entry.expires_at {
            return Err(AuthCodeError::Expired);
        }
        if entry.state == AuthCodeState::Complete {
            return Err(AuthCodeError::AlreadyUsed);
        }
        entry.state = AuthCodeState::Complete;
        Ok(entry.clone())
    }

    /// Remove expired and exchanged codes
    pub fn sweep(&self, now: DateTime<Utc>) {
        self.lock()
            .retain(|_, entry| now < entry.expires_at && entry.state == AuthCodeState::Pending);
    }

    /// Number of stored codes, live or not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no codes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
