// ABOUTME: External collaborator seams for bearer token minting and identity resolution
// ABOUTME: Defines the opaque token envelope plus default implementations used by the server binary
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

//! Authentication seams of the OAuth core.
//!
//! The authorization server treats two operations as external calls:
//! minting a bearer token for `(user id, scope, client id)` via
//! [`TokenIssuer`], and resolving an authenticated identity from an
//! identity-provider code via [`IdentityProvider`]. The default
//! implementations here are what the server binary wires in; tests
//! substitute their own.

use crate::config::environment::IdentityProviderConfig;
use crate::errors::{AppError, AppResult, ErrorCode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;
use uuid::Uuid;

/// Client id recorded on sessions minted for the site itself rather than a
/// registered client application
pub const SITE_CLIENT_ID: &str = "arcadia-site";

/// Scope recorded on first-party browser sessions
pub const SCOPE_ALL: &str = "all";

/// A minted bearer token with its session metadata
///
/// The wire form handed to clients is the base64-encoded JSON of this
/// struct; the OAuth core never inspects it after minting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    /// Opaque session secret
    pub secret: String,
    /// User the session belongs to
    pub uid: i64,
    /// Space-separated granted scopes
    pub scope: String,
    /// Client application the session was minted for
    pub client_id: String,
    /// Unix timestamp the session expires at
    pub expires_at: i64,
    /// Address of the request that created the session
    pub ip_addr: String,
}

impl SessionToken {
    /// Encode this token into the opaque envelope handed to clients
    ///
    /// # Errors
    /// Returns an error if JSON serialization fails
    pub fn encode_envelope(&self) -> AppResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| {
            AppError::new(ErrorCode::SerializationError, "failed to serialize token").with_source(e)
        })?;
        Ok(general_purpose::STANDARD.encode(json))
    }

    /// Decode an envelope back into a token
    ///
    /// Used by the consent endpoints to recover the browser session from
    /// the login cookie. Returns `None` for anything malformed.
    #[must_use]
    pub fn decode_envelope(envelope: &str) -> Option<Self> {
        let json = general_purpose::STANDARD.decode(envelope).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// Identity returned by the external identity provider
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIdentity {
    /// Stable numeric user id at the provider
    pub id: i64,
    /// Display name
    pub username: String,
    /// Avatar asset hash, if any
    pub avatar: Option<String>,
}

/// Mints bearer tokens for authenticated principals
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Mint a bearer token for `(user id, scope, client id)` from the given address
    async fn issue_token(
        &self,
        user_id: i64,
        scope: &str,
        client_id: &str,
        ip_addr: &str,
    ) -> Result<SessionToken>;
}

/// Resolves an authenticated identity from an identity-provider code
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the consent URL the browser is redirected to, carrying `state`
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange the callback `code` for the authenticated identity
    async fn resolve_identity(&self, code: &str) -> Result<RemoteIdentity>;
}

/// In-memory session issuer used by the server binary
///
/// Sessions live only as long as the process; the surrounding site is
/// expected to persist them, which is outside this core.
pub struct InMemorySessionIssuer {
    sessions: Mutex<HashMap<String, SessionToken>>,
    session_expiration_seconds: i64,
}

impl InMemorySessionIssuer {
    #[must_use]
    pub fn new(session_expiration_seconds: i64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            session_expiration_seconds,
        }
    }

    /// Number of live sessions, for introspection
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TokenIssuer for InMemorySessionIssuer {
    async fn issue_token(
        &self,
        user_id: i64,
        scope: &str,
        client_id: &str,
        ip_addr: &str,
    ) -> Result<SessionToken> {
        let token = SessionToken {
            secret: Uuid::new_v4().to_string(),
            uid: user_id,
            scope: scope.to_owned(),
            client_id: client_id.to_owned(),
            expires_at: (Utc::now() + Duration::seconds(self.session_expiration_seconds))
                .timestamp(),
            ip_addr: ip_addr.to_owned(),
        };

        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?
            .insert(token.secret.clone(), token.clone());

        tracing::info!(uid = user_id, client_id, scope, "issued bearer token");
        Ok(token)
    }
}

/// Discord-style identity provider speaking standard OAuth2 code exchange
pub struct RemoteIdentityProvider {
    config: IdentityProviderConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ProviderTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ProviderUserResponse {
    id: String,
    username: String,
    avatar: Option<String>,
    global_name: Option<String>,
}

impl RemoteIdentityProvider {
    #[must_use]
    pub fn new(config: IdentityProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    fn authorize_url(&self, state: &str) -> String {
        match Url::parse(&self.config.authorize_url) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("client_id", &self.config.client_id)
                    .append_pair("redirect_uri", &self.config.redirect_uri)
                    .append_pair("response_type", "code")
                    .append_pair("scope", "identify")
                    .append_pair("state", state);
                url.into()
            }
            // Config is validated at startup; a bad URL here only loses the query
            Err(_) => self.config.authorize_url.clone(),
        }
    }

    async fn resolve_identity(&self, code: &str) -> Result<RemoteIdentity> {
        let token: ProviderTokenResponse = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .context("identity provider token request failed")?
            .error_for_status()
            .context("identity provider rejected code exchange")?
            .json()
            .await
            .context("failed to parse identity provider token response")?;

        let user: ProviderUserResponse = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("identity provider userinfo request failed")?
            .error_for_status()
            .context("identity provider rejected userinfo request")?
            .json()
            .await
            .context("failed to parse identity provider user response")?;

        let id = user
            .id
            .parse::<i64>()
            .context("identity provider returned a non-numeric user id")?;

        // Prefer the display name when the provider supplies one
        let username = match user.global_name {
            Some(name) if !name.is_empty() => name,
            _ => user.username,
        };

        Ok(RemoteIdentity {
            id,
            username,
            avatar: user.avatar,
        })
    }
}
