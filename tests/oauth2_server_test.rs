// ABOUTME: Integration tests for the Client Credentials grant and the owner endpoints
// ABOUTME: Covers Basic authentication, machine allowlists, and secret rotation semantics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Arcadia Preservation Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use arcadia_auth_server::errors::ErrorCode;
use arcadia_auth_server::oauth2::clients::SERVICE_ACCOUNT_MIN_ID;
use arcadia_auth_server::oauth2::models::TokenRequest;
use chrono::Utc;

fn credentials_request(scope: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: "client_credentials".to_owned(),
        code: None,
        redirect_uri: None,
        client_id: None,
        device_code: None,
        scope: scope.map(str::to_owned),
    }
}

#[tokio::test]
async fn test_client_credentials_mints_service_account_token() {
    let server = common::test_server();
    let secret = server
        .regenerate_secret("arcadia-community", common::OWNER_USER_ID)
        .unwrap();

    let token = server
        .token(
            &credentials_request(Some("identity game:read")),
            Some(("arcadia-community", &secret)),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .unwrap();

    let session = common::decode_bearer(&token.access_token);
    assert!(session.uid >= SERVICE_ACCOUNT_MIN_ID);
    assert_eq!(session.scope, "identity game:read");
    assert_eq!(session.client_id, "arcadia-community");
}

#[tokio::test]
async fn test_client_credentials_uses_machine_allowlist() {
    let server = common::test_server();
    let secret = server
        .regenerate_secret("arcadia-community", common::OWNER_USER_ID)
        .unwrap();

    // submission:edit is valid but not on the community machine allowlist
    let err = server
        .token(
            &credentials_request(Some("submission:edit")),
            Some(("arcadia-community", &secret)),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_scope");

    // Absent scope falls back to the default
    let token = server
        .token(
            &credentials_request(None),
            Some(("arcadia-community", &secret)),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(common::decode_bearer(&token.access_token).scope, "identity");
}

#[tokio::test]
async fn test_client_credentials_authentication_failures() {
    let server = common::test_server();

    // No Basic header
    let err = server
        .token(&credentials_request(None), None, "10.0.0.5", Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // Unknown client
    let err = server
        .token(
            &credentials_request(None),
            Some(("nobody", "whatever")),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");

    // Known client, no secret on record yet
    let err = server
        .token(
            &credentials_request(None),
            Some(("arcadia-community", "whatever")),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "unauthorized_client");
}

#[tokio::test]
async fn test_rotation_invalidates_old_secret() {
    let server = common::test_server();
    let old = server
        .regenerate_secret("arcadia-community", common::OWNER_USER_ID)
        .unwrap();
    let new = server
        .regenerate_secret("arcadia-community", common::OWNER_USER_ID)
        .unwrap();
    assert_ne!(old, new);

    let err = server
        .token(
            &credentials_request(None),
            Some(("arcadia-community", &old)),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "unauthorized_client");

    assert!(server
        .token(
            &credentials_request(None),
            Some(("arcadia-community", &new)),
            "10.0.0.5",
            Utc::now(),
        )
        .await
        .is_ok());
}

#[test]
fn test_secret_rotation_is_owner_gated() {
    let server = common::test_server();

    let err = server.regenerate_secret("arcadia-community", 1).unwrap_err();
    assert_eq!(err.code, ErrorCode::PermissionDenied);

    let err = server.regenerate_secret("no-such-app", common::OWNER_USER_ID).unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceNotFound);
}

#[test]
fn test_owned_apps_listing() {
    let server = common::test_server();

    let apps = server.owned_apps(common::OWNER_USER_ID);
    let ids: Vec<_> = apps.iter().map(|a| a.client_id.as_str()).collect();
    assert_eq!(ids, vec!["arcadia-launcher", "arcadia-community"]);

    assert!(server.owned_apps(1).is_empty());
}

#[test]
fn test_sweep_runs_across_all_stores() {
    // Smoke check: sweeping an empty server is a no-op and never panics
    let server = common::test_server();
    server.sweep_expired(Utc::now());
}
