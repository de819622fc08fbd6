// ABOUTME: Client secret issuance and verification backed by bcrypt digests
// ABOUTME: Only digests are retained; the plaintext secret is shown once at rotation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use super::codes::{random_code, WIDE_CHARSET};
use crate::errors::{AppError, AppResult, ErrorCode};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// bcrypt work factor for client secret digests
pub const BCRYPT_COST: u32 = 14;

/// Length of generated client secrets
pub const CLIENT_SECRET_LEN: usize = 64;

/// Holds bcrypt digests of client secrets, keyed by client id
///
/// A client with no recorded digest cannot authenticate; its owner must
/// rotate the secret first.
pub struct ClientSecretVerifier {
    digests: Mutex<HashMap<String, String>>,
}

impl Default for ClientSecretVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSecretVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            digests: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.digests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate a fresh secret for the client, replacing any previous one
    ///
    /// Returns the plaintext secret. This is the only time it is ever
    /// available; only the bcrypt digest is stored.
    ///
    /// # Errors
    /// Returns an error if the system RNG or bcrypt fails
    pub fn regenerate(&self, client_id: &str) -> AppResult<String> {
        let secret = random_code(WIDE_CHARSET, CLIENT_SECRET_LEN)?;
        let digest = bcrypt::hash(&secret, BCRYPT_COST).map_err(|e| {
            AppError::new(ErrorCode::InternalError, "failed to hash client secret").with_source(e)
        })?;
        self.lock().insert(client_id.to_owned(), digest);
        Ok(secret)
    }

    /// Check a presented secret against the stored digest
    ///
    /// Returns `false` for an unknown client, a client with no secret on
    /// record, or a digest mismatch. bcrypt verification failures read as
    /// a mismatch rather than an error.
    #[must_use]
    pub fn verify(&self, client_id: &str, presented: &str) -> bool {
        let digest = match self.lock().get(client_id) {
            Some(digest) => digest.clone(),
            None => return false,
        };
        bcrypt::verify(presented, &digest).unwrap_or(false)
    }

    /// Whether the client has a secret on record
    #[must_use]
    pub fn has_secret(&self, client_id: &str) -> bool {
        self.lock().contains_key(client_id)
    }
}
