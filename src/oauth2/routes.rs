// ABOUTME: axum handlers and router for the OAuth endpoints under /auth plus the owner API
// ABOUTME: Translates HTTP concerns (cookies, Basic auth, client addresses) into orchestrator calls
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use super::models::{AuthorizeRequest, DeviceAuthRequest, TokenRequest};
use super::server::{OAuth2AuthorizationServer, DEFAULT_LOGIN_DEST};
use crate::auth::SessionToken;
use crate::errors::AppError;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Name of the first-party session cookie
pub const SESSION_COOKIE: &str = "arcadia_session";

type ServerState = State<Arc<OAuth2AuthorizationServer>>;

/// Build the application router
pub fn router(server: Arc<OAuth2AuthorizationServer>) -> Router {
    Router::new()
        .route("/auth", get(login))
        .route("/auth/callback", get(login_callback))
        .route("/auth/authorize", get(authorize_view).post(authorize_consent))
        .route("/auth/device", get(device_view).post(device_authorization))
        .route("/auth/device/respond", post(device_respond))
        .route("/auth/token", post(token))
        .route("/api/client-apps", get(owned_apps))
        .route(
            "/api/client-app/:client_id/regenerate-secret",
            post(regenerate_secret),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    dest: Option<String>,
}

/// GET /auth — start the browser login handshake
async fn login(
    State(server): ServerState,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let dest = query.dest.as_deref().unwrap_or(DEFAULT_LOGIN_DEST);
    let url = server.begin_login(dest, Utc::now())?;
    Ok(Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    state: String,
    code: String,
}

/// GET /auth/callback — finish the handshake, set the session cookie
async fn login_callback(
    State(server): ServerState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers, addr);
    let (session, dest) = server
        .complete_login(&query.state, &query.code, &ip, Utc::now())
        .await?;

    let envelope = session.encode_envelope()?;
    let max_age = session.expires_at - Utc::now().timestamp();
    let cookie = format!(
        "{SESSION_COOKIE}={envelope}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax"
    );

    let mut response = Redirect::to(&dest).into_response();
    match cookie.parse() {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
            Ok(response)
        }
        Err(_) => Err(AppError::internal("failed to encode session cookie")),
    }
}

/// GET /auth/authorize — consent view data for the code grant
async fn authorize_view(
    State(server): ServerState,
    Query(req): Query<AuthorizeRequest>,
) -> Response {
    match server.authorize_view(&req) {
        Ok(data) => Json(data).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /auth/authorize — record consent, answer with the redirect URL
///
/// The body is the final redirect URL as plain text; the browser-side
/// script performs the navigation.
async fn authorize_consent(
    State(server): ServerState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(req): Form<AuthorizeRequest>,
) -> Response {
    let session = match session_from_cookie(&headers) {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    let ip = client_ip(&headers, addr);
    match server.authorize_consent(&req, session.uid, &ip, Utc::now()) {
        Ok(redirect_url) => redirect_url.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /auth/device — start a device flow
async fn device_authorization(
    State(server): ServerState,
    Form(req): Form<DeviceAuthRequest>,
) -> Response {
    match server.device_authorization(&req, Utc::now()) {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct UserCodeQuery {
    user_code: String,
}

/// GET /auth/device?user_code= — consent view data for the approval page
async fn device_view(
    State(server): ServerState,
    Query(query): Query<UserCodeQuery>,
) -> Response {
    match server.device_view(&query.user_code, Utc::now()) {
        Ok(data) => Json(data).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct DeviceRespondQuery {
    user_code: String,
    action: String,
}

/// POST /auth/device/respond?user_code=&action= — apply the human decision
async fn device_respond(
    State(server): ServerState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<DeviceRespondQuery>,
) -> Response {
    let session = match session_from_cookie(&headers) {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    let ip = client_ip(&headers, addr);
    match server
        .device_respond(&query.user_code, &query.action, session.uid, &ip, Utc::now())
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /auth/token — token endpoint for all three grant types
async fn token(
    State(server): ServerState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    basic: Option<TypedHeader<Authorization<Basic>>>,
    Form(req): Form<TokenRequest>,
) -> Response {
    let ip = client_ip(&headers, addr);
    let credentials = basic.as_ref().map(|TypedHeader(auth)| (auth.username(), auth.password()));
    match server.token(&req, credentials, &ip, Utc::now()).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/client-apps — client applications owned by the caller
async fn owned_apps(State(server): ServerState, headers: HeaderMap) -> Response {
    let session = match session_from_cookie(&headers) {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    Json(server.owned_apps(session.uid)).into_response()
}

/// POST /api/client-app/:client_id/regenerate-secret — rotate and return
/// the plaintext secret once
async fn regenerate_secret(
    State(server): ServerState,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let session = match session_from_cookie(&headers) {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    match server.regenerate_secret(&client_id, session.uid) {
        Ok(secret) => Json(json!({ "secret": secret })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Recover the first-party session from the request cookies
///
/// The consent and owner endpoints require a logged-in browser session.
fn session_from_cookie(headers: &HeaderMap) -> Result<SessionToken, AppError> {
    let cookies = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::auth_required)?;

    let envelope = cookies
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then_some(value)
        })
        .next()
        .ok_or_else(AppError::auth_required)?;

    let session = SessionToken::decode_envelope(envelope)
        .ok_or_else(|| AppError::auth_invalid("malformed session cookie"))?;
    if session.expires_at <= Utc::now().timestamp() {
        return Err(AppError::auth_invalid("session has expired"));
    }
    Ok(session)
}

/// Best-effort client address: proxy header first, socket address otherwise
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or_else(|| addr.ip().to_string(), |ip| ip.trim().to_owned())
}
