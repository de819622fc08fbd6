// ABOUTME: Closed catalog of OAuth scope tokens with human-readable descriptions
// ABOUTME: Provides the ordered scope intersection used by every grant's validation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use serde::Serialize;

/// Scope granted when a request carries no `scope` parameter
pub const DEFAULT_SCOPE: &str = "identity";

/// A named capability grant with its consent-page description
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AuthScope {
    /// Stable scope token
    pub name: &'static str,
    /// Human description shown on consent pages
    pub description: &'static str,
}

/// The full, closed catalog of valid scopes
pub const AUTH_SCOPES: &[AuthScope] = &[
    AuthScope {
        name: "identity",
        description: "Read your username, avatar, community roles, and notification settings",
    },
    AuthScope {
        name: "profile:edit",
        description: "Edit your notification and submission subscription settings",
    },
    AuthScope {
        name: "profile:apps-read",
        description: "Read capabilities of your profile's client applications",
    },
    AuthScope {
        name: "submission:read",
        description: "Read basic submission information (comments, metadata)",
    },
    AuthScope {
        name: "submission:read-files",
        description: "Read and download submission files",
    },
    AuthScope {
        name: "submission:edit",
        description: "Edit submission information",
    },
    AuthScope {
        name: "submission:upload",
        description: "Upload new submission files",
    },
    AuthScope {
        name: "archive:read",
        description: "Read basic archive information (archive metadata)",
    },
    AuthScope {
        name: "archive:read-files",
        description: "Read and download archive files and directories",
    },
    AuthScope {
        name: "archive:upload",
        description: "Upload new archive files",
    },
    AuthScope {
        name: "game-data:read",
        description: "Read game data info and file indexes",
    },
    AuthScope {
        name: "game-data:edit",
        description: "Edit game data info",
    },
    AuthScope {
        name: "game:read",
        description: "Read game metadata",
    },
    AuthScope {
        name: "game:edit",
        description: "Edit game metadata",
    },
];

/// Look up a scope in the catalog by name
#[must_use]
pub fn describe(name: &str) -> Option<&'static AuthScope> {
    AUTH_SCOPES.iter().find(|s| s.name == name)
}

/// Names of every scope in the catalog, for `invalid_scope` error messages
#[must_use]
pub fn all_scope_names() -> Vec<&'static str> {
    AUTH_SCOPES.iter().map(|s| s.name).collect()
}

/// Ordered set intersection of the requested scope string and an allowlist
///
/// Preserves request order, drops duplicates, and never yields a scope
/// absent from the allowlist.
#[must_use]
pub fn filter_scopes(requested: &str, allowlist: &[String]) -> Vec<String> {
    let mut granted: Vec<String> = Vec::new();
    for token in requested.split(' ').filter(|t| !t.is_empty()) {
        if allowlist.iter().any(|allowed| allowed == token) && !granted.iter().any(|g| g == token) {
            granted.push(token.to_owned());
        }
    }
    granted
}

/// Resolve a space-separated scope string to catalog entries for consent pages
#[must_use]
pub fn resolve_descriptions(scope: &str) -> Vec<&'static AuthScope> {
    scope
        .split(' ')
        .filter_map(describe)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_filter_preserves_request_order() {
        let allowlist = allow(&["identity", "game:read", "game:edit"]);
        let granted = filter_scopes("game:edit identity", &allowlist);
        assert_eq!(granted, vec!["game:edit", "identity"]);
    }

    #[test]
    fn test_filter_drops_unknown_and_disallowed() {
        // Scenario: client allows [identity, game:read, game:edit]
        let allowlist = allow(&["identity", "game:read", "game:edit"]);
        let granted = filter_scopes("identity game:read bogus", &allowlist);
        assert_eq!(granted, vec!["identity", "game:read"]);
    }

    #[test]
    fn test_filter_never_yields_outside_allowlist() {
        let allowlist = allow(&["identity"]);
        for scope in all_scope_names() {
            let granted = filter_scopes(scope, &allowlist);
            assert!(granted.iter().all(|g| g == "identity"));
        }
    }

    #[test]
    fn test_filter_dedupes() {
        let allowlist = allow(&["identity", "game:read"]);
        let granted = filter_scopes("identity identity game:read", &allowlist);
        assert_eq!(granted, vec!["identity", "game:read"]);
    }

    #[test]
    fn test_catalog_is_closed_and_described() {
        assert!(describe("identity").is_some());
        assert!(describe("bogus").is_none());
        assert_eq!(all_scope_names().len(), AUTH_SCOPES.len());
    }
}
