// ABOUTME: Device Authorization grant store holding device-code/user-code pairs with poll state
// ABOUTME: Bearer tokens attached on approval are claimable exactly once by the polling client
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use super::clients::ClientApplication;
use super::codes::{random_code, USER_CODE_CHARSET, WIDE_CHARSET};
use crate::errors::AppResult;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Length of the machine-held device code
pub const DEVICE_CODE_LEN: usize = 32;

/// Length of the human-typed user code
pub const USER_CODE_LEN: usize = 8;

/// Poll state of a device flow token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFlowState {
    /// Waiting for the human to approve or deny
    Pending,
    /// Human denied the request
    Denied,
    /// Human approved; a bearer token was attached
    Complete,
}

/// A device-code/user-code pair and its flow state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFlowToken {
    /// Long machine-held secret the client polls with
    pub device_code: String,
    /// Short code the human types on the verification page
    pub user_code: String,
    /// Granted scope, already filtered against the client's allowlist
    pub scope: String,
    /// Client the pair was issued to
    pub client_id: String,
    /// Page where the human enters the user code
    pub verification_uri: String,
    /// Verification page with the user code pre-filled
    pub verification_uri_complete: String,
    /// Issue time plus the device flow TTL
    pub expires_at: DateTime<Utc>,
    /// Seconds the client should wait between polls
    pub interval: i64,
    /// Current flow state
    pub state: DeviceFlowState,
    /// Bearer token envelope, attached on approval and cleared on first claim
    pub bearer_token: Option<String>,
}

/// Why a user-code lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceFlowError {
    #[error("device code not found")]
    NotFound,
    #[error("device code has expired")]
    Expired,
}

/// Outcome of a machine poll against the device code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePollOutcome {
    /// No live token for this device code and client
    NotFound,
    /// Human has not responded yet; the client retries at the interval
    Pending,
    /// Human denied the request
    Denied,
    /// The token's window elapsed before approval was claimed
    Expired,
    /// Approved; the bearer token is handed over exactly once
    Complete(String),
    /// Approved, but the bearer token was already claimed by an earlier poll
    AlreadyClaimed,
}

struct DeviceFlowInner {
    /// Tokens keyed by user code
    by_user_code: HashMap<String, DeviceFlowToken>,
    /// Device code to user code index for the polling path
    by_device_code: HashMap<String, String>,
}

/// In-memory store for the Device Authorization grant
pub struct DeviceFlowStore {
    inner: Mutex<DeviceFlowInner>,
    verification_uri: String,
    ttl: Duration,
    interval: i64,
}

impl DeviceFlowStore {
    /// Create a store issuing tokens that live for `ttl_seconds` and
    /// advertise `interval_seconds` between polls
    ///
    /// `base_url` is the public site root; the verification page lives at
    /// `{base_url}/auth/device`.
    #[must_use]
    pub fn new(base_url: &str, ttl_seconds: i64, interval_seconds: i64) -> Self {
        Self {
            inner: Mutex::new(DeviceFlowInner {
                by_user_code: HashMap::new(),
                by_device_code: HashMap::new(),
            }),
            verification_uri: format!("{}/auth/device", base_url.trim_end_matches('/')),
            ttl: Duration::seconds(ttl_seconds),
            interval: interval_seconds,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceFlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue a fresh device-code/user-code pair for the given client
    ///
    /// Codes are generated together, 1:1, and regenerated on the (unlikely)
    /// collision with a still-live token so neither is ever shared.
    ///
    /// # Errors
    /// Returns an error if the system RNG fails
    pub fn new_token(
        &self,
        scope: &str,
        client: &ClientApplication,
        now: DateTime<Utc>,
    ) -> AppResult<DeviceFlowToken> {
        let mut inner = self.lock();

        let device_code = loop {
            let candidate = random_code(WIDE_CHARSET, DEVICE_CODE_LEN)?;
            if !inner.by_device_code.contains_key(&candidate) {
                break candidate;
            }
        };
        let user_code = loop {
            let candidate = random_code(USER_CODE_CHARSET, USER_CODE_LEN)?;
            if !inner.by_user_code.contains_key(&candidate) {
                break candidate;
            }
        };

        let token = DeviceFlowToken {
            device_code: device_code.clone(),
            user_code: user_code.clone(),
            scope: scope.to_owned(),
            client_id: client.client_id.clone(),
            verification_uri: self.verification_uri.clone(),
            verification_uri_complete: format!(
                "{}?user_code={user_code}",
                self.verification_uri
            ),
            expires_at: now + self.ttl,
            interval: self.interval,
            state: DeviceFlowState::Pending,
            bearer_token: None,
        };

        inner.by_device_code.insert(device_code, user_code.clone());
        inner.by_user_code.insert(user_code, token.clone());
        Ok(token)
    }

    /// Look up a token by user code, for the human approval page
    ///
    /// # Errors
    /// `NotFound` for an unknown code, `Expired` once the window elapsed
    pub fn get_by_user_code(
        &self,
        user_code: &str,
        now: DateTime<Utc>,
    ) -> Result<DeviceFlowToken, DeviceFlowError> {
        let inner = self.lock();
        let token = inner
            .by_user_code
            .get(user_code)
            .ok_or(DeviceFlowError::NotFound)?;
        if now >= token.expires_at {
            return Err(DeviceFlowError::Expired);
        }
        Ok(token.clone())
    }

    /// Poll by device code, claiming the bearer token if one is attached
    ///
    /// The read-and-clear on a completed token happens in one critical
    /// section: exactly one poll observes `Complete` with the token, every
    /// later poll observes `AlreadyClaimed`. Expiry is evaluated before the
    /// state so a timed-out token always reads as expired.
    pub fn get_and_claim_by_device_code(
        &self,
        device_code: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> DevicePollOutcome {
        let mut inner = self.lock();
        let Some(user_code) = inner.by_device_code.get(device_code).cloned() else {
            return DevicePollOutcome::NotFound;
        };
        let Some(token) = inner.by_user_code.get_mut(&user_code) else {
            return DevicePollOutcome::NotFound;
        };
        if token.client_id != client_id {
            return DevicePollOutcome::NotFound;
        }
        if now >= token.expires_at {
            return DevicePollOutcome::Expired;
        }
        match token.state {
            DeviceFlowState::Pending => DevicePollOutcome::Pending,
            DeviceFlowState::Denied => DevicePollOutcome::Denied,
            DeviceFlowState::Complete => match token.bearer_token.take() {
                Some(bearer) => DevicePollOutcome::Complete(bearer),
                None => DevicePollOutcome::AlreadyClaimed,
            },
        }
    }

    /// Attach a bearer token and mark the flow complete
    ///
    /// # Errors
    /// `NotFound` or `Expired` when the user code no longer identifies a live token
    pub fn approve(
        &self,
        user_code: &str,
        bearer_token: String,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceFlowError> {
        let mut inner = self.lock();
        let token = inner
            .by_user_code
            .get_mut(user_code)
            .ok_or(DeviceFlowError::NotFound)?;
        if now >= token.expires_at {
            return Err(DeviceFlowError::Expired);
        }
        token.state = DeviceFlowState::Complete;
        token.bearer_token = Some(bearer_token);
        Ok(())
    }

    /// Mark the flow denied
    ///
    /// # Errors
    /// `NotFound` or `Expired` when the user code no longer identifies a live token
    pub fn deny(&self, user_code: &str, now: DateTime<Utc>) -> Result<(), DeviceFlowError> {
        let mut inner = self.lock();
        let token = inner
            .by_user_code
            .get_mut(user_code)
            .ok_or(DeviceFlowError::NotFound)?;
        if now >= token.expires_at {
            return Err(DeviceFlowError::Expired);
        }
        token.state = DeviceFlowState::Denied;
        Ok(())
    }

    /// Remove entries past their expiry from both indexes
    pub fn sweep(&self, now: DateTime<Utc>) {
        let mut inner = self.lock();
        let expired: Vec<(String, String)> = inner
            .by_user_code
            .iter()
            .filter(|(_, token)| now >= token.expires_at)
            .map(|(user_code, token)| (user_code.clone(), token.device_code.clone()))
            .collect();
        for (user_code, device_code) in expired {
            inner.by_user_code.remove(&user_code);
            inner.by_device_code.remove(&device_code);
        }
    }

    /// Number of stored tokens, live or not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().by_user_code.len()
    }

    /// Whether the store holds no tokens
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().by_user_code.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::oauth2::clients::ClientRegistry;

    fn launcher() -> ClientApplication {
        ClientRegistry::builtin()
            .get("arcadia-launcher")
            .cloned()
            .unwrap()
    }

    fn store() -> DeviceFlowStore {
        DeviceFlowStore::new("https://arcadia.example", 900, 3)
    }

    #[test]
    fn test_pair_generated_together_with_declared_charsets() {
        let store = store();
        let token = store.new_token("identity", &launcher(), Utc::now()).unwrap();

        assert_eq!(token.device_code.len(), DEVICE_CODE_LEN);
        assert!(token.device_code.bytes().all(|b| WIDE_CHARSET.contains(&b)));
        assert_eq!(token.user_code.len(), USER_CODE_LEN);
        assert!(token
            .user_code
            .bytes()
            .all(|b| USER_CODE_CHARSET.contains(&b)));
        assert_eq!(
            token.verification_uri_complete,
            format!("https://arcadia.example/auth/device?user_code={}", token.user_code)
        );
    }

    #[test]
    fn test_no_two_live_tokens_share_codes() {
        let store = store();
        let now = Utc::now();
        let mut device_codes = std::collections::HashSet::new();
        let mut user_codes = std::collections::HashSet::new();
        for _ in 0..50 {
            let token = store.new_token("identity", &launcher(), now).unwrap();
            assert!(device_codes.insert(token.device_code));
            assert!(user_codes.insert(token.user_code));
        }
    }

    #[test]
    fn test_poll_lifecycle_pending_then_complete_then_claimed() {
        let store = store();
        let now = Utc::now();
        let token = store.new_token("identity", &launcher(), now).unwrap();
        let client_id = "arcadia-launcher";

        assert_eq!(
            store.get_and_claim_by_device_code(&token.device_code, client_id, now),
            DevicePollOutcome::Pending
        );

        store
            .approve(&token.user_code, "bearer-envelope".into(), now)
            .unwrap();

        assert_eq!(
            store.get_and_claim_by_device_code(&token.device_code, client_id, now),
            DevicePollOutcome::Complete("bearer-envelope".into())
        );

        // Claim-once: the second poll must not repeat the token, and must
        // not fall back to authorization_pending either
        assert_eq!(
            store.get_and_claim_by_device_code(&token.device_code, client_id, now),
            DevicePollOutcome::AlreadyClaimed
        );
    }

    #[test]
    fn test_denied_and_expired_outcomes() {
        let store = store();
        let now = Utc::now();

        let denied = store.new_token("identity", &launcher(), now).unwrap();
        store.deny(&denied.user_code, now).unwrap();
        assert_eq!(
            store.get_and_claim_by_device_code(&denied.device_code, "arcadia-launcher", now),
            DevicePollOutcome::Denied
        );

        let stale = store.new_token("identity", &launcher(), now).unwrap();
        let late = now + Duration::seconds(900);
        assert_eq!(
            store.get_and_claim_by_device_code(&stale.device_code, "arcadia-launcher", late),
            DevicePollOutcome::Expired
        );
    }

    #[test]
    fn test_poll_requires_matching_client() {
        let store = store();
        let now = Utc::now();
        let token = store.new_token("identity", &launcher(), now).unwrap();

        assert_eq!(
            store.get_and_claim_by_device_code(&token.device_code, "arcadia-community", now),
            DevicePollOutcome::NotFound
        );
    }

    #[test]
    fn test_user_code_lookup_gates_on_expiry() {
        let store = store();
        let now = Utc::now();
        let token = store.new_token("identity", &launcher(), now).unwrap();

        assert!(store.get_by_user_code(&token.user_code, now).is_ok());
        assert_eq!(
            store.get_by_user_code(&token.user_code, now + Duration::seconds(900)),
            Err(DeviceFlowError::Expired)
        );
        assert_eq!(
            store.get_by_user_code("ZZZZZZZZ", now),
            Err(DeviceFlowError::NotFound)
        );
    }

    #[test]
    fn test_sweep_removes_both_indexes() {
        let store = store();
        let now = Utc::now();
        let token = store.new_token("identity", &launcher(), now).unwrap();

        store.sweep(now + Duration::seconds(901));
        assert!(store.is_empty());
        assert_eq!(
            store.get_and_claim_by_device_code(&token.device_code, "arcadia-launcher", now),
            DevicePollOutcome::NotFound
        );
    }
}
