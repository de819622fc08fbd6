// ABOUTME: Request and response wire types for the OAuth 2.0 endpoints
// ABOUTME: Includes the RFC 6749 error body with its HTTP status mapping
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use super::scopes::AuthScope;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Query/form parameters of the authorization endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// Form parameters of the device authorization endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthRequest {
    pub client_id: String,
    pub scope: Option<String>,
}

/// Form parameters of the token endpoint, shared across the grant types
///
/// Which fields are required depends on `grant_type`; absent fields from
/// another grant's vocabulary are simply `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub device_code: Option<String>,
    pub scope: Option<String>,
}

/// Successful token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    /// Wrap a bearer envelope in the standard response shape
    #[must_use]
    pub fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in,
        }
    }
}

/// Device authorization endpoint response, RFC 8628 §3.2
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFlowResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: i64,
    pub interval: i64,
}

/// Data the consent views render: who is asking, for what
#[derive(Debug, Clone, Serialize)]
pub struct ConsentPageData {
    /// Display name of the requesting client
    pub client_name: String,
    /// Scopes being requested, with descriptions
    pub scopes: Vec<&'static AuthScope>,
}

/// RFC 6749 §5.2 error body
///
/// Every protocol-level failure on the OAuth endpoints uses this shape;
/// application faults outside the protocol use
/// [`crate::errors::ErrorResponse`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    pub error: String,
    pub error_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    /// The request is missing a parameter or is otherwise malformed
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: description.into(),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-4.1.2.1".to_owned()),
        }
    }

    /// Client authentication failed
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: description.into(),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// The presented grant (code, device code) is invalid or spent
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: description.into(),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// No requested scope survived validation
    ///
    /// Lists the full scope catalog so callers can self-correct.
    pub fn invalid_scope(valid_scopes: &[&str]) -> Self {
        Self {
            error: "invalid_scope".to_owned(),
            error_description: format!(
                "The requested scope is invalid or unknown. Valid scopes: {}",
                valid_scopes.join(", ")
            ),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-3.3".to_owned()),
        }
    }

    /// The client may not use this grant type
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self {
            error: "unauthorized_client".to_owned(),
            error_description: description.into(),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// The redirect URI is not on the client's allowlist
    pub fn invalid_redirect_uri(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: description.into(),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-3.1.2".to_owned()),
        }
    }

    /// The resource owner denied the request
    #[must_use]
    pub fn access_denied() -> Self {
        Self {
            error: "access_denied".to_owned(),
            error_description: "The resource owner denied the authorization request".to_owned(),
            error_uri: Some("https://tools.ietf.org/html/rfc6749#section-4.1.2.1".to_owned()),
        }
    }

    /// Device flow poll: the human has not responded yet
    #[must_use]
    pub fn authorization_pending() -> Self {
        Self {
            error: "authorization_pending".to_owned(),
            error_description: "The authorization request is still pending".to_owned(),
            error_uri: Some("https://tools.ietf.org/html/rfc8628#section-3.5".to_owned()),
        }
    }

    /// Device flow poll: the device code window elapsed
    #[must_use]
    pub fn expired_token() -> Self {
        Self {
            error: "expired_token".to_owned(),
            error_description: "The device code has expired".to_owned(),
            error_uri: Some("https://tools.ietf.org/html/rfc8628#section-3.5".to_owned()),
        }
    }

    /// Unexpected internal failure surfaced through the protocol body
    pub fn server_error(description: impl Into<String>) -> Self {
        Self {
            error: "server_error".to_owned(),
            error_description: description.into(),
            error_uri: None,
        }
    }

    /// HTTP status this error is served with
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" | "unauthorized_client" => StatusCode::UNAUTHORIZED,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            OAuth2Error::invalid_client("bad secret").http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OAuth2Error::unauthorized_client("no grant").http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OAuth2Error::server_error("boom").http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OAuth2Error::authorization_pending().http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuth2Error::expired_token().http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_invalid_scope_lists_catalog() {
        let err = OAuth2Error::invalid_scope(&["identity", "game:read"]);
        assert!(err.error_description.contains("identity, game:read"));
    }

    #[test]
    fn test_error_uri_omitted_when_absent() {
        let json = serde_json::to_string(&OAuth2Error::server_error("boom")).unwrap();
        assert!(!json.contains("error_uri"));
    }
}
