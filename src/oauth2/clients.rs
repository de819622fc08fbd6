// ABOUTME: Static registry of client applications registered with the authorization server
// ABOUTME: Immutable after process start; constructed once and injected into the orchestrator
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use serde::Serialize;

/// Service accounts bound to client applications start above this id so
/// they never collide with human users
pub const SERVICE_ACCOUNT_MIN_ID: i64 = 1000;

/// A registered client application
#[derive(Debug, Clone, Serialize)]
pub struct ClientApplication {
    /// Stable, unique client identifier
    pub client_id: String,
    /// Display name shown on consent pages
    pub name: String,
    /// Scopes the client may request on behalf of a user
    pub scopes: Vec<String>,
    /// Scopes the client may request for itself via Client Credentials
    pub client_creds_scopes: Vec<String>,
    /// Exact-match redirect URI allowlist for the Authorization Code grant
    pub redirect_uris: Vec<String>,
    /// User who owns this registration and may rotate its secret
    pub owner_user_id: Option<i64>,
    /// Service account identity bound to Client Credentials grants
    pub service_account_user_id: i64,
}

/// Static, in-process table of registered client applications
pub struct ClientRegistry {
    apps: Vec<ClientApplication>,
}

impl ClientRegistry {
    /// Build a registry from an explicit application list
    #[must_use]
    pub fn new(apps: Vec<ClientApplication>) -> Self {
        Self { apps }
    }

    /// The applications registered with the Arcadia deployment
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![
            ClientApplication {
                client_id: "arcadia-launcher".into(),
                name: "Arcadia Launcher".into(),
                scopes: vec!["identity".into(), "game:read".into(), "game:edit".into()],
                client_creds_scopes: vec![],
                redirect_uris: vec![],
                owner_user_id: Some(689_080_719_460_663_414),
                service_account_user_id: SERVICE_ACCOUNT_MIN_ID + 2,
            },
            ClientApplication {
                client_id: "arcadia-community".into(),
                name: "Arcadia Community".into(),
                scopes: vec!["identity".into()],
                client_creds_scopes: vec!["identity".into(), "game:read".into()],
                redirect_uris: vec!["https://community.arcadia.example/auth/callback".into()],
                owner_user_id: Some(689_080_719_460_663_414),
                service_account_user_id: SERVICE_ACCOUNT_MIN_ID + 3,
            },
        ])
    }

    /// Look up a client by id
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&ClientApplication> {
        self.apps.iter().find(|app| app.client_id == client_id)
    }

    /// Applications owned by the given user
    #[must_use]
    pub fn owned_by(&self, user_id: i64) -> Vec<&ClientApplication> {
        self.apps
            .iter()
            .filter(|app| app.owner_user_id == Some(user_id))
            .collect()
    }

    /// All registered applications
    #[must_use]
    pub fn all(&self) -> &[ClientApplication] {
        &self.apps
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = ClientRegistry::builtin();
        assert!(registry.get("arcadia-launcher").is_some());
        assert!(registry.get("unknown-client").is_none());
    }

    #[test]
    fn test_user_and_machine_allowlists_are_distinct() {
        let registry = ClientRegistry::builtin();
        let community = registry.get("arcadia-community").unwrap();
        assert_eq!(community.scopes, vec!["identity"]);
        assert_eq!(community.client_creds_scopes, vec!["identity", "game:read"]);
    }

    #[test]
    fn test_owned_by_filters_on_owner() {
        let registry = ClientRegistry::builtin();
        assert_eq!(registry.owned_by(689_080_719_460_663_414).len(), 2);
        assert!(registry.owned_by(1).is_empty());
    }
}
