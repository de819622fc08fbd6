// ABOUTME: Shared test fixtures: mock token issuer and identity provider, server construction
// ABOUTME: Mocks are deterministic so tests can assert on minted token contents
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Arcadia Preservation Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use arcadia_auth_server::auth::{IdentityProvider, RemoteIdentity, SessionToken, TokenIssuer};
use arcadia_auth_server::config::environment::OAuthConfig;
use arcadia_auth_server::oauth2::clients::ClientRegistry;
use arcadia_auth_server::oauth2::OAuth2AuthorizationServer;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const TEST_BASE_URL: &str = "https://arcadia.example";
pub const SESSION_EXPIRATION_SECONDS: i64 = 86_400;
pub const OWNER_USER_ID: i64 = 689_080_719_460_663_414;

/// Deterministic token issuer recording what it minted
pub struct MockIssuer {
    counter: AtomicU64,
}

impl MockIssuer {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn issued_count(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for MockIssuer {
    async fn issue_token(
        &self,
        user_id: i64,
        scope: &str,
        client_id: &str,
        ip_addr: &str,
    ) -> anyhow::Result<SessionToken> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SessionToken {
            secret: format!("mock-secret-{n}"),
            uid: user_id,
            scope: scope.to_owned(),
            client_id: client_id.to_owned(),
            expires_at: (Utc::now() + Duration::seconds(SESSION_EXPIRATION_SECONDS)).timestamp(),
            ip_addr: ip_addr.to_owned(),
        })
    }
}

/// Issuer whose minting always fails, for internal-error paths
pub struct FailingIssuer;

#[async_trait]
impl TokenIssuer for FailingIssuer {
    async fn issue_token(
        &self,
        _user_id: i64,
        _scope: &str,
        _client_id: &str,
        _ip_addr: &str,
    ) -> anyhow::Result<SessionToken> {
        anyhow::bail!("issuer unavailable")
    }
}

/// Identity provider resolving every code to the same test user
pub struct MockIdentityProvider;

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://idp.example/authorize?state={state}")
    }

    async fn resolve_identity(&self, code: &str) -> anyhow::Result<RemoteIdentity> {
        if code == "bad-code" {
            anyhow::bail!("provider rejected code");
        }
        Ok(RemoteIdentity {
            id: 42,
            username: "tester".to_owned(),
            avatar: None,
        })
    }
}

pub fn test_server() -> Arc<OAuth2AuthorizationServer> {
    test_server_with_issuer(Arc::new(MockIssuer::new()))
}

pub fn test_server_with_issuer(issuer: Arc<dyn TokenIssuer>) -> Arc<OAuth2AuthorizationServer> {
    Arc::new(OAuth2AuthorizationServer::new(
        TEST_BASE_URL,
        &OAuthConfig::default(),
        SESSION_EXPIRATION_SECONDS,
        ClientRegistry::builtin(),
        issuer,
        Arc::new(MockIdentityProvider),
    ))
}

/// Decode the bearer envelope a token endpoint response carries
pub fn decode_bearer(access_token: &str) -> SessionToken {
    SessionToken::decode_envelope(access_token).expect("access token must be a valid envelope")
}
