// ABOUTME: Grant orchestrator tying the client registry, ephemeral stores, and token issuer together
// ABOUTME: Implements the three grant types plus the browser login handshake and owner endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

//! # OAuth 2.0 Authorization Server
//!
//! Orchestrates the Authorization Code, Device Authorization, and Client
//! Credentials grants over the in-memory stores, and runs the CSRF-protected
//! browser login handshake against the external identity provider. HTTP
//! concerns live in [`crate::oauth2::routes`]; this type speaks in domain
//! values and protocol errors.

use super::auth_codes::{AuthCodeError, AuthorizationCodeStore};
use super::clients::{ClientApplication, ClientRegistry};
use super::device_flow::{DeviceFlowError, DeviceFlowStore, DevicePollOutcome};
use super::login_state::LoginStateKeeper;
use super::models::{
    AuthorizeRequest, ConsentPageData, DeviceAuthRequest, DeviceFlowResponse, OAuth2Error,
    TokenRequest, TokenResponse,
};
use super::scopes::{all_scope_names, filter_scopes, resolve_descriptions, DEFAULT_SCOPE};
use super::secrets::ClientSecretVerifier;
use crate::auth::{IdentityProvider, SessionToken, TokenIssuer, SCOPE_ALL, SITE_CLIENT_ID};
use crate::config::environment::OAuthConfig;
use crate::errors::{AppError, AppResult, ErrorCode};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Destination used when the login handshake carries none or an unsafe one
pub const DEFAULT_LOGIN_DEST: &str = "/web/profile";

/// Grant type URN for the Device Authorization grant, RFC 8628
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// The authorization server core
///
/// Owns the four ephemeral stores and the client registry; bearer token
/// minting and identity resolution are delegated to the injected
/// collaborators.
pub struct OAuth2AuthorizationServer {
    clients: ClientRegistry,
    login_states: LoginStateKeeper,
    auth_codes: AuthorizationCodeStore,
    device_flows: DeviceFlowStore,
    secrets: ClientSecretVerifier,
    token_issuer: Arc<dyn TokenIssuer>,
    identity_provider: Arc<dyn IdentityProvider>,
    session_expiration_seconds: i64,
}

impl OAuth2AuthorizationServer {
    /// Wire up the server from its configuration and collaborators
    #[must_use]
    pub fn new(
        base_url: &str,
        oauth: &OAuthConfig,
        session_expiration_seconds: i64,
        clients: ClientRegistry,
        token_issuer: Arc<dyn TokenIssuer>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            clients,
            login_states: LoginStateKeeper::new(oauth.login_state_ttl_seconds),
            auth_codes: AuthorizationCodeStore::new(oauth.auth_code_ttl_seconds),
            device_flows: DeviceFlowStore::new(
                base_url,
                oauth.device_flow_ttl_seconds,
                oauth.device_poll_interval_seconds,
            ),
            secrets: ClientSecretVerifier::new(),
            token_issuer,
            identity_provider,
            session_expiration_seconds,
        }
    }

    /// Access the secret verifier, for seeding secrets at startup
    #[must_use]
    pub fn secrets(&self) -> &ClientSecretVerifier {
        &self.secrets
    }

    // ---- browser login handshake ----

    /// Start the login handshake: record a nonce, return the provider URL
    ///
    /// # Errors
    /// Returns an error if state serialization fails
    pub fn begin_login(&self, dest: &str, now: DateTime<Utc>) -> AppResult<String> {
        let state = self.login_states.generate(dest, now)?;
        Ok(self.identity_provider.authorize_url(&state))
    }

    /// Finish the login handshake: check the nonce, resolve the identity,
    /// mint a first-party session
    ///
    /// Returns the session token and the validated post-login destination.
    ///
    /// # Errors
    /// Returns `AuthInvalid` on a state mismatch and an internal error when
    /// the identity provider or token issuer fails
    pub async fn complete_login(
        &self,
        state: &str,
        code: &str,
        ip_addr: &str,
        now: DateTime<Utc>,
    ) -> AppResult<(SessionToken, String)> {
        let Some(dest) = self.login_states.consume(state, now) else {
            tracing::warn!("login callback with unknown or expired state");
            return Err(AppError::auth_invalid("state does not match"));
        };

        let identity = self
            .identity_provider
            .resolve_identity(code)
            .await
            .map_err(|e| {
                AppError::new(
                    ErrorCode::ExternalServiceError,
                    format!("identity provider exchange failed: {e:#}"),
                )
            })?;

        let token = self
            .token_issuer
            .issue_token(identity.id, SCOPE_ALL, SITE_CLIENT_ID, ip_addr)
            .await
            .map_err(|e| AppError::internal(format!("failed to mint session: {e:#}")))?;

        tracing::info!(uid = identity.id, username = %identity.username, "user logged in");
        Ok((token, sanitize_destination(&dest)))
    }

    // ---- authorization code grant ----

    /// Validate an authorization request and return consent view data
    ///
    /// # Errors
    /// Protocol errors for an unknown client, unlisted redirect URI, or a
    /// scope request with no valid survivor
    pub fn authorize_view(&self, req: &AuthorizeRequest) -> Result<ConsentPageData, OAuth2Error> {
        let (client, scope) = self.validate_authorize(req)?;
        Ok(ConsentPageData {
            client_name: client.name.clone(),
            scopes: resolve_descriptions(&scope),
        })
    }

    /// Record consent and issue an authorization code
    ///
    /// Returns the redirect URL carrying `code` and the echoed `state`.
    ///
    /// # Errors
    /// Protocol errors as for [`Self::authorize_view`], plus `server_error`
    /// when code generation fails
    pub fn authorize_consent(
        &self,
        req: &AuthorizeRequest,
        user_id: i64,
        ip_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<String, OAuth2Error> {
        let (client, scope) = self.validate_authorize(req)?;

        let code = self
            .auth_codes
            .new_code(user_id, &client.client_id, &req.redirect_uri, &scope, ip_addr, now)
            .map_err(|e| {
                tracing::error!(error = %e, "authorization code generation failed");
                OAuth2Error::server_error("failed to generate authorization code")
            })?;

        let mut url = url::Url::parse(&req.redirect_uri).map_err(|_| {
            OAuth2Error::invalid_redirect_uri("redirect_uri is not a valid URL")
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("code", &code.code);
            if let Some(state) = &req.state {
                pairs.append_pair("state", state);
            }
        }

        tracing::info!(client_id = %client.client_id, user_id, scope = %scope, "authorization code issued");
        Ok(url.into())
    }

    fn validate_authorize(
        &self,
        req: &AuthorizeRequest,
    ) -> Result<(&ClientApplication, String), OAuth2Error> {
        if let Some(response_type) = &req.response_type {
            if response_type != "code" {
                return Err(OAuth2Error::invalid_request(
                    "response_type must be 'code'",
                ));
            }
        }

        let client = self
            .clients
            .get(&req.client_id)
            .ok_or_else(|| OAuth2Error::invalid_client("unknown client_id"))?;

        if !client.redirect_uris.iter().any(|uri| uri == &req.redirect_uri) {
            tracing::warn!(client_id = %client.client_id, redirect_uri = %req.redirect_uri, "redirect_uri not on allowlist");
            return Err(OAuth2Error::invalid_redirect_uri(
                "redirect_uri is not registered for this client",
            ));
        }

        let scope = granted_scope(req.scope.as_deref(), &client.scopes)?;
        Ok((client, scope))
    }

    // ---- device authorization grant ----

    /// Start a device flow: validate the client, mint a code pair
    ///
    /// # Errors
    /// Protocol errors for an unknown client or an all-invalid scope request
    pub fn device_authorization(
        &self,
        req: &DeviceAuthRequest,
        now: DateTime<Utc>,
    ) -> Result<DeviceFlowResponse, OAuth2Error> {
        let client = self
            .clients
            .get(&req.client_id)
            .ok_or_else(|| OAuth2Error::invalid_client("unknown client_id"))?;

        let scope = granted_scope(req.scope.as_deref(), &client.scopes)?;

        let token = self.device_flows.new_token(&scope, client, now).map_err(|e| {
            tracing::error!(error = %e, "device code generation failed");
            OAuth2Error::server_error("failed to generate device code")
        })?;

        tracing::info!(client_id = %client.client_id, user_code = %token.user_code, "device flow started");
        let expires_in = (token.expires_at - now).num_seconds();
        Ok(DeviceFlowResponse {
            device_code: token.device_code,
            user_code: token.user_code,
            verification_uri: token.verification_uri,
            verification_uri_complete: token.verification_uri_complete,
            expires_in,
            interval: token.interval,
        })
    }

    /// Consent view data for the device approval page
    ///
    /// # Errors
    /// Protocol errors for an unknown or expired user code
    pub fn device_view(
        &self,
        user_code: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsentPageData, OAuth2Error> {
        let token = self
            .device_flows
            .get_by_user_code(user_code, now)
            .map_err(device_flow_error)?;
        let client_name = self
            .clients
            .get(&token.client_id)
            .map_or_else(|| token.client_id.clone(), |c| c.name.clone());
        Ok(ConsentPageData {
            client_name,
            scopes: resolve_descriptions(&token.scope),
        })
    }

    /// Apply the human's decision to a pending device flow
    ///
    /// Approval mints the bearer token immediately and attaches it for the
    /// next poll to claim.
    ///
    /// # Errors
    /// Protocol errors for an unknown action, an unknown or expired user
    /// code, or a token minting failure
    pub async fn device_respond(
        &self,
        user_code: &str,
        action: &str,
        user_id: i64,
        ip_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OAuth2Error> {
        match action {
            "approve" => {
                let token = self
                    .device_flows
                    .get_by_user_code(user_code, now)
                    .map_err(device_flow_error)?;

                let session = self
                    .token_issuer
                    .issue_token(user_id, &token.scope, &token.client_id, ip_addr)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "token minting failed during device approval");
                        OAuth2Error::server_error("failed to mint token")
                    })?;
                let envelope = session.encode_envelope().map_err(|e| {
                    tracing::error!(error = %e, "token envelope encoding failed");
                    OAuth2Error::server_error("failed to encode token")
                })?;

                self.device_flows
                    .approve(user_code, envelope, now)
                    .map_err(device_flow_error)?;
                tracing::info!(user_id, client_id = %token.client_id, "device flow approved");
                Ok(())
            }
            "deny" => {
                self.device_flows
                    .deny(user_code, now)
                    .map_err(device_flow_error)?;
                tracing::info!(user_id, "device flow denied");
                Ok(())
            }
            _ => Err(OAuth2Error::invalid_request(
                "action must be 'approve' or 'deny'",
            )),
        }
    }

    // ---- token endpoint ----

    /// Dispatch a token request on its grant type
    ///
    /// `basic` carries HTTP Basic credentials when the client sent them;
    /// only the Client Credentials grant requires them.
    ///
    /// # Errors
    /// Protocol errors per grant; see RFC 6749 §5.2 and RFC 8628 §3.5
    pub async fn token(
        &self,
        req: &TokenRequest,
        basic: Option<(&str, &str)>,
        ip_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, OAuth2Error> {
        match req.grant_type.as_str() {
            "authorization_code" => self.token_authorization_code(req, ip_addr, now).await,
            DEVICE_CODE_GRANT => self.token_device_code(req, now),
            "client_credentials" => self.token_client_credentials(req, basic, ip_addr).await,
            other => {
                tracing::warn!(grant_type = %other, "unsupported grant type");
                Err(OAuth2Error::invalid_grant("unsupported grant type"))
            }
        }
    }

    async fn token_authorization_code(
        &self,
        req: &TokenRequest,
        ip_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let code = req
            .code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("code is required"))?;
        let redirect_uri = req
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("redirect_uri is required"))?;
        let client_id = req
            .client_id
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("client_id is required"))?;

        // One critical section: a replayed or raced code reads AlreadyUsed
        let auth_code = self.auth_codes.consume(code, now).map_err(|e| match e {
            AuthCodeError::NotFound => OAuth2Error::invalid_grant("auth code not found"),
            AuthCodeError::Expired => OAuth2Error::invalid_grant("auth code has expired"),
            AuthCodeError::AlreadyUsed => {
                tracing::warn!(client_id, "authorization code replay attempt");
                OAuth2Error::invalid_grant("auth code has already been used")
            }
        })?;

        // The code stays burned on either mismatch
        if auth_code.client_id != client_id {
            tracing::warn!(client_id, "auth code presented by the wrong client");
            return Err(OAuth2Error::invalid_grant(
                "auth code was not issued to this client",
            ));
        }
        if auth_code.redirect_uri != redirect_uri {
            tracing::warn!(client_id, "auth code exchange with mismatched redirect_uri");
            return Err(OAuth2Error::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }

        let session = self
            .token_issuer
            .issue_token(auth_code.user_id, &auth_code.scope, client_id, ip_addr)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "token minting failed during code exchange");
                OAuth2Error::server_error("failed to mint token")
            })?;
        let envelope = session.encode_envelope().map_err(|e| {
            tracing::error!(error = %e, "token envelope encoding failed");
            OAuth2Error::server_error("failed to encode token")
        })?;

        Ok(TokenResponse::bearer(envelope, self.session_expiration_seconds))
    }

    fn token_device_code(
        &self,
        req: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let device_code = req
            .device_code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("device_code is required"))?;
        let client_id = req
            .client_id
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("client_id is required"))?;

        match self
            .device_flows
            .get_and_claim_by_device_code(device_code, client_id, now)
        {
            DevicePollOutcome::Complete(envelope) => {
                tracing::info!(client_id, "device flow token claimed");
                Ok(TokenResponse::bearer(envelope, self.session_expiration_seconds))
            }
            // Expected steady state while the human decides
            DevicePollOutcome::Pending => {
                tracing::debug!(client_id, "device flow poll while pending");
                Err(OAuth2Error::authorization_pending())
            }
            DevicePollOutcome::Denied => Err(OAuth2Error::access_denied()),
            DevicePollOutcome::Expired => Err(OAuth2Error::expired_token()),
            DevicePollOutcome::NotFound => Err(OAuth2Error::invalid_grant("device code not found")),
            DevicePollOutcome::AlreadyClaimed => {
                tracing::error!(client_id, "device flow token claimed twice");
                Err(OAuth2Error::server_error("token already claimed"))
            }
        }
    }

    async fn token_client_credentials(
        &self,
        req: &TokenRequest,
        basic: Option<(&str, &str)>,
        ip_addr: &str,
    ) -> Result<TokenResponse, OAuth2Error> {
        let (client_id, client_secret) = basic.ok_or_else(|| {
            OAuth2Error::invalid_client("client authentication required via HTTP Basic")
        })?;

        let client = self
            .clients
            .get(client_id)
            .ok_or_else(|| OAuth2Error::invalid_client("unknown client_id"))?;

        if !self.secrets.verify(client_id, client_secret) {
            tracing::warn!(client_id, "client credentials with wrong secret");
            return Err(OAuth2Error::unauthorized_client("invalid client secret"));
        }

        let scope = granted_scope(req.scope.as_deref(), &client.client_creds_scopes)?;

        let session = self
            .token_issuer
            .issue_token(client.service_account_user_id, &scope, client_id, ip_addr)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "token minting failed for client credentials");
                OAuth2Error::server_error("failed to mint token")
            })?;
        let envelope = session.encode_envelope().map_err(|e| {
            tracing::error!(error = %e, "token envelope encoding failed");
            OAuth2Error::server_error("failed to encode token")
        })?;

        tracing::info!(client_id, scope = %scope, "client credentials token issued");
        Ok(TokenResponse::bearer(envelope, self.session_expiration_seconds))
    }

    // ---- owner endpoints ----

    /// Client applications owned by the given user
    #[must_use]
    pub fn owned_apps(&self, user_id: i64) -> Vec<&ClientApplication> {
        self.clients.owned_by(user_id)
    }

    /// Rotate a client's secret, returning the plaintext exactly once
    ///
    /// # Errors
    /// `ResourceNotFound` for an unknown client, `PermissionDenied` when the
    /// caller does not own it, internal error if generation fails
    pub fn regenerate_secret(&self, client_id: &str, user_id: i64) -> AppResult<String> {
        let client = self
            .clients
            .get(client_id)
            .ok_or_else(|| AppError::not_found("client application"))?;

        if client.owner_user_id != Some(user_id) {
            tracing::warn!(client_id, user_id, "secret rotation denied for non-owner");
            return Err(AppError::new(
                ErrorCode::PermissionDenied,
                "only the application owner may rotate its secret",
            ));
        }

        let secret = self.secrets.regenerate(client_id)?;
        tracing::info!(client_id, user_id, "client secret rotated");
        Ok(secret)
    }

    // ---- housekeeping ----

    /// Drop expired entries from every ephemeral store
    pub fn sweep_expired(&self, now: DateTime<Utc>) {
        self.login_states.clean(now);
        self.auth_codes.sweep(now);
        self.device_flows.sweep(now);
    }

    /// Spawn the recurring sweep task
    pub fn spawn_sweeper(self: &Arc<Self>, interval_seconds: u64) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                server.sweep_expired(Utc::now());
            }
        });
    }
}

/// Resolve the scope a request is granted against an allowlist
///
/// Absent or blank requests get the default scope; a non-empty request
/// whose intersection with the allowlist is empty is rejected with the
/// full catalog listed.
fn granted_scope(requested: Option<&str>, allowlist: &[String]) -> Result<String, OAuth2Error> {
    match requested {
        None => Ok(DEFAULT_SCOPE.to_owned()),
        Some(s) if s.trim().is_empty() => Ok(DEFAULT_SCOPE.to_owned()),
        Some(s) => {
            let granted = filter_scopes(s, allowlist);
            if granted.is_empty() {
                return Err(OAuth2Error::invalid_scope(&all_scope_names()));
            }
            Ok(granted.join(" "))
        }
    }
}

/// Clamp a post-login destination to a site-local path
fn sanitize_destination(dest: &str) -> String {
    // Reject absolute URLs and protocol-relative paths
    if dest.starts_with('/') && !dest.starts_with("//") {
        dest.to_owned()
    } else {
        DEFAULT_LOGIN_DEST.to_owned()
    }
}

fn device_flow_error(e: DeviceFlowError) -> OAuth2Error {
    match e {
        DeviceFlowError::NotFound => OAuth2Error::invalid_request("user code not found"),
        DeviceFlowError::Expired => OAuth2Error::expired_token(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_scope_defaults_and_rejects() {
        let allowlist = vec!["identity".to_owned(), "game:read".to_owned()];

        assert_eq!(granted_scope(None, &allowlist).unwrap(), "identity");
        assert_eq!(granted_scope(Some(""), &allowlist).unwrap(), "identity");
        assert_eq!(
            granted_scope(Some("game:read identity"), &allowlist).unwrap(),
            "game:read identity"
        );

        let err = granted_scope(Some("archive:upload"), &allowlist).unwrap_err();
        assert_eq!(err.error, "invalid_scope");
    }

    #[test]
    fn test_sanitize_destination() {
        assert_eq!(sanitize_destination("/web/submissions"), "/web/submissions");
        assert_eq!(sanitize_destination("https://evil.example"), DEFAULT_LOGIN_DEST);
        assert_eq!(sanitize_destination("//evil.example"), DEFAULT_LOGIN_DEST);
        assert_eq!(sanitize_destination(""), DEFAULT_LOGIN_DEST);
    }
}
