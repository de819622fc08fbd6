// ABOUTME: Integration tests for the Device Authorization grant end to end
// ABOUTME: Covers code pair issuance, poll states, approval, denial, and the claim-once bearer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Arcadia Preservation Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use arcadia_auth_server::oauth2::models::{DeviceAuthRequest, TokenRequest};
use arcadia_auth_server::oauth2::server::DEVICE_CODE_GRANT;
use chrono::{Duration, Utc};

fn device_request() -> DeviceAuthRequest {
    DeviceAuthRequest {
        client_id: "arcadia-launcher".to_owned(),
        scope: Some("identity game:read".to_owned()),
    }
}

fn poll_request(device_code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: DEVICE_CODE_GRANT.to_owned(),
        code: None,
        redirect_uri: None,
        client_id: Some("arcadia-launcher".to_owned()),
        device_code: Some(device_code.to_owned()),
        scope: None,
    }
}

#[tokio::test]
async fn test_device_flow_approval_end_to_end() {
    let server = common::test_server();
    let now = Utc::now();

    let flow = server.device_authorization(&device_request(), now).unwrap();
    assert_eq!(flow.device_code.len(), 32);
    assert_eq!(flow.user_code.len(), 8);
    assert_eq!(flow.verification_uri, "https://arcadia.example/auth/device");
    assert_eq!(
        flow.verification_uri_complete,
        format!("https://arcadia.example/auth/device?user_code={}", flow.user_code)
    );
    assert_eq!(flow.expires_in, 900);
    assert_eq!(flow.interval, 3);

    // Machine polls before the human decides
    let err = server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "authorization_pending");

    // Human reviews the request on the verification page
    let view = server.device_view(&flow.user_code, now).unwrap();
    assert_eq!(view.client_name, "Arcadia Launcher");
    let names: Vec<_> = view.scopes.iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["identity", "game:read"]);

    server
        .device_respond(&flow.user_code, "approve", 7, "10.0.0.1", now)
        .await
        .unwrap();

    let token = server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", now)
        .await
        .unwrap();
    assert_eq!(token.token_type, "Bearer");
    let session = common::decode_bearer(&token.access_token);
    assert_eq!(session.uid, 7);
    assert_eq!(session.scope, "identity game:read");
    assert_eq!(session.client_id, "arcadia-launcher");
}

#[tokio::test]
async fn test_bearer_token_is_claimable_once() {
    let server = common::test_server();
    let now = Utc::now();

    let flow = server.device_authorization(&device_request(), now).unwrap();
    server
        .device_respond(&flow.user_code, "approve", 7, "10.0.0.1", now)
        .await
        .unwrap();

    server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", now)
        .await
        .unwrap();

    // The second claim is a distinguished internal error, not a retry state
    let err = server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "server_error");
    assert!(err.error_description.contains("already claimed"));
}

#[tokio::test]
async fn test_denied_flow_polls_access_denied() {
    let server = common::test_server();
    let now = Utc::now();

    let flow = server.device_authorization(&device_request(), now).unwrap();
    server
        .device_respond(&flow.user_code, "deny", 7, "10.0.0.1", now)
        .await
        .unwrap();

    let err = server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "access_denied");
}

#[tokio::test]
async fn test_expired_flow_polls_expired_token() {
    let server = common::test_server();
    let issued = Utc::now();

    let flow = server
        .device_authorization(&device_request(), issued)
        .unwrap();

    let late = issued + Duration::seconds(900);
    let err = server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", late)
        .await
        .unwrap_err();
    assert_eq!(err.error, "expired_token");

    // Approval is also gated on expiry
    assert!(server
        .device_respond(&flow.user_code, "approve", 7, "10.0.0.1", late)
        .await
        .is_err());
}

#[tokio::test]
async fn test_poll_with_wrong_client_or_code_is_invalid_grant() {
    let server = common::test_server();
    let now = Utc::now();

    let flow = server.device_authorization(&device_request(), now).unwrap();

    let mut wrong_client = poll_request(&flow.device_code);
    wrong_client.client_id = Some("arcadia-community".to_owned());
    let err = server
        .token(&wrong_client, None, "10.0.0.3", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");

    let err = server
        .token(&poll_request("no-such-device-code"), None, "10.0.0.3", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let server = common::test_server();
    let now = Utc::now();

    let flow = server.device_authorization(&device_request(), now).unwrap();
    let err = server
        .device_respond(&flow.user_code, "maybe", 7, "10.0.0.1", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_request");

    // The flow is untouched and still pending
    let err = server
        .token(&poll_request(&flow.device_code), None, "10.0.0.3", now)
        .await
        .unwrap_err();
    assert_eq!(err.error, "authorization_pending");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let server = common::test_server();
    let req = TokenRequest {
        grant_type: "password".to_owned(),
        code: None,
        redirect_uri: None,
        client_id: None,
        device_code: None,
        scope: None,
    };
    let err = server.token(&req, None, "10.0.0.3", Utc::now()).await.unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}
