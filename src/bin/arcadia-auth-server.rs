// ABOUTME: Server binary wiring configuration, logging, stores, and the axum router together
// ABOUTME: Seeds client secrets at startup, spawns the store sweeper, serves until ctrl-c
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use anyhow::{Context, Result};
use arcadia_auth_server::auth::{InMemorySessionIssuer, RemoteIdentityProvider};
use arcadia_auth_server::config::ServerConfig;
use arcadia_auth_server::logging::LoggingConfig;
use arcadia_auth_server::oauth2::clients::ClientRegistry;
use arcadia_auth_server::oauth2::routes;
use arcadia_auth_server::oauth2::OAuth2AuthorizationServer;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let logging = LoggingConfig::from_env();
    logging.init().context("failed to initialize logging")?;

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.http_port,
        base_url = %config.base_url,
        "starting arcadia auth server"
    );

    let registry = ClientRegistry::builtin();
    let token_issuer = Arc::new(InMemorySessionIssuer::new(config.session_expiration_seconds));
    let identity_provider = Arc::new(RemoteIdentityProvider::new(config.identity_provider.clone()));

    let server = Arc::new(OAuth2AuthorizationServer::new(
        &config.base_url,
        &config.oauth,
        config.session_expiration_seconds,
        registry,
        token_issuer,
        identity_provider,
    ));

    // Confidential clients start each process with a fresh secret; the
    // plaintext is logged once so operators can hand it to the client
    for client_id in ["arcadia-community"] {
        let secret = server
            .regenerate_secret(client_id, 689_080_719_460_663_414)
            .map_err(|e| anyhow::anyhow!("failed to seed secret for {client_id}: {e}"))?;
        tracing::info!(client_id, secret = %secret, "seeded client secret");
    }

    server.spawn_sweeper(config.oauth.sweep_interval_seconds);

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        routes::router(server).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
}
