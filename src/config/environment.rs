// ABOUTME: Environment-driven server configuration with sensible development defaults
// ABOUTME: Covers listen address, public base URL, token lifetimes, and identity provider endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use anyhow::{Context, Result};
use std::env;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// HTTP listen port
    pub http_port: u16,
    /// Public base URL of the site, used to build device verification URIs
    pub base_url: String,
    /// Lifetime of minted bearer tokens and session cookies, in seconds
    pub session_expiration_seconds: i64,
    /// OAuth protocol timing knobs
    pub oauth: OAuthConfig,
    /// External identity provider endpoints for the browser login handshake
    pub identity_provider: IdentityProviderConfig,
}

/// Timing configuration for the ephemeral OAuth stores
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Anti-CSRF login state lifetime
    pub login_state_ttl_seconds: i64,
    /// Authorization code lifetime
    pub auth_code_ttl_seconds: i64,
    /// Device flow token lifetime
    pub device_flow_ttl_seconds: i64,
    /// Advertised device flow poll interval
    pub device_poll_interval_seconds: i64,
    /// Period of the background sweep over the expiring stores
    pub sweep_interval_seconds: u64,
}

/// External identity provider (Discord-style OAuth2) endpoints
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    /// Authorization endpoint the browser is redirected to
    pub authorize_url: String,
    /// Token endpoint for the code exchange
    pub token_url: String,
    /// Userinfo endpoint returning the authenticated identity
    pub userinfo_url: String,
    /// Our client id at the identity provider
    pub client_id: String,
    /// Our client secret at the identity provider
    pub client_secret: String,
    /// Callback URL registered with the identity provider
    pub redirect_uri: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a numeric variable fails to parse
    pub fn from_env() -> Result<Self> {
        let host = env_var_or("HOST", "127.0.0.1");
        let http_port = env_var_or("HTTP_PORT", "8080")
            .parse::<u16>()
            .context("HTTP_PORT must be a valid port number")?;
        let base_url = env_var_or("BASE_URL", "http://localhost:8080");

        Ok(Self {
            host,
            http_port,
            base_url: base_url.trim_end_matches('/').to_owned(),
            session_expiration_seconds: parse_i64("SESSION_EXPIRATION_SECONDS", "86400")?,
            oauth: OAuthConfig {
                login_state_ttl_seconds: parse_i64("LOGIN_STATE_TTL_SECONDS", "30")?,
                auth_code_ttl_seconds: parse_i64("AUTH_CODE_TTL_SECONDS", "300")?,
                device_flow_ttl_seconds: parse_i64("DEVICE_FLOW_TTL_SECONDS", "900")?,
                device_poll_interval_seconds: parse_i64("DEVICE_POLL_INTERVAL_SECONDS", "3")?,
                sweep_interval_seconds: parse_i64("STORE_SWEEP_INTERVAL_SECONDS", "60")?
                    .unsigned_abs(),
            },
            identity_provider: IdentityProviderConfig {
                authorize_url: env_var_or(
                    "IDP_AUTHORIZE_URL",
                    "https://discord.com/api/oauth2/authorize",
                ),
                token_url: env_var_or("IDP_TOKEN_URL", "https://discord.com/api/oauth2/token"),
                userinfo_url: env_var_or("IDP_USERINFO_URL", "https://discord.com/api/users/@me"),
                client_id: env_var_or("IDP_CLIENT_ID", ""),
                client_secret: env_var_or("IDP_CLIENT_SECRET", ""),
                redirect_uri: format!("{}/auth/callback", base_url.trim_end_matches('/')),
            },
        })
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            login_state_ttl_seconds: 30,
            auth_code_ttl_seconds: 300,
            device_flow_ttl_seconds: 900,
            device_poll_interval_seconds: 3,
            sweep_interval_seconds: 60,
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_i64(key: &str, default: &str) -> Result<i64> {
    env_var_or(key, default)
        .parse::<i64>()
        .with_context(|| format!("{key} must be an integer"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_lifetimes() {
        let config = OAuthConfig::default();
        assert_eq!(config.login_state_ttl_seconds, 30);
        assert_eq!(config.auth_code_ttl_seconds, 300);
        assert_eq!(config.device_flow_ttl_seconds, 900);
        assert_eq!(config.device_poll_interval_seconds, 3);
    }
}
