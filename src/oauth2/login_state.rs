// ABOUTME: Short-lived anti-CSRF nonce store for the browser-redirect login handshake
// ABOUTME: Nonces are single-use and expire thirty seconds after issue
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use crate::errors::{AppError, AppResult, ErrorCode};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// State blob carried through the identity provider redirect
#[derive(Debug, Serialize, Deserialize)]
struct LoginState {
    nonce: String,
    dest: String,
}

/// Anti-CSRF nonce store for the login handshake
///
/// Issued nonces are recorded with their issue time and consumed exactly
/// once; anything expired, unknown, or malformed reads as absent.
pub struct LoginStateKeeper {
    states: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl LoginStateKeeper {
    /// Create a keeper whose nonces live for `ttl_seconds`
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate a fresh state blob carrying the post-login destination
    ///
    /// Opportunistically evicts expired nonces on every call.
    ///
    /// # Errors
    /// Returns an error only if serialization fails
    pub fn generate(&self, dest: &str, now: DateTime<Utc>) -> AppResult<String> {
        self.clean(now);

        let state = LoginState {
            nonce: Uuid::new_v4().to_string(),
            dest: dest.to_owned(),
        };
        self.lock().insert(state.nonce.clone(), now);

        let json = serde_json::to_vec(&state).map_err(|e| {
            AppError::new(ErrorCode::SerializationError, "failed to serialize login state")
                .with_source(e)
        })?;
        Ok(general_purpose::URL_SAFE.encode(json))
    }

    /// Consume a state blob, returning the destination it was issued for
    ///
    /// Single use: the nonce is deleted on first success. Returns `None`
    /// for malformed input, an unknown nonce, or an expired nonce; the
    /// caller answers with a generic state-mismatch error.
    #[must_use]
    pub fn consume(&self, blob: &str, now: DateTime<Utc>) -> Option<String> {
        let json = general_purpose::URL_SAFE.decode(blob).ok()?;
        let state: LoginState = serde_json::from_slice(&json).ok()?;

        let issued_at = self.lock().remove(&state.nonce)?;
        if now - issued_at >= self.ttl {
            return None;
        }
        Some(state.dest)
    }

    /// Drop every nonce older than the expiration window
    pub fn clean(&self, now: DateTime<Utc>) {
        self.lock().retain(|_, issued_at| now - *issued_at < self.ttl);
    }

    /// Number of live nonces
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no nonces are live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
