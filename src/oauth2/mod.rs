// ABOUTME: OAuth 2.0 protocol core: stores, wire models, grant orchestration, HTTP routes
// ABOUTME: Everything here is ephemeral per-request protocol state; durable concerns sit behind crate::auth
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

//! # OAuth 2.0 Authorization Core
//!
//! - [`scopes`]: the closed scope catalog and scope intersection
//! - [`clients`]: the static client application registry
//! - [`login_state`], [`auth_codes`], [`device_flow`]: the expiring,
//!   single-use protocol stores
//! - [`secrets`]: bcrypt-backed client secret verification
//! - [`server`]: the grant orchestrator
//! - [`routes`]: the axum HTTP surface under `/auth`

pub mod auth_codes;
pub mod clients;
pub mod codes;
pub mod device_flow;
pub mod login_state;
pub mod models;
pub mod routes;
pub mod scopes;
pub mod secrets;
pub mod server;

pub use models::{OAuth2Error, TokenResponse};
pub use server::OAuth2AuthorizationServer;
