// ABOUTME: Library entry point for the Arcadia submission system's OAuth 2.0 authorization core
// ABOUTME: Exposes the grant orchestrator, token stores, and HTTP surface for the /auth endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

#![deny(unsafe_code)]

//! # Arcadia Auth Server
//!
//! The embedded OAuth 2.0 authorization server of the Arcadia
//! software-preservation submission site. Three grant types are supported:
//!
//! - **Authorization Code** for browser-based client applications
//! - **Device Authorization** for the launcher and other input-constrained clients
//! - **Client Credentials** for confidential machine-to-machine clients
//!
//! plus the CSRF-protected browser login handshake against the external
//! identity provider.
//!
//! All per-request protocol state (login nonces, authorization codes,
//! device flow tokens) is ephemeral, expiring, and single-use, held in
//! in-memory stores owned by the [`oauth2::server::OAuth2AuthorizationServer`].
//! Long-lived concerns (user accounts, bearer token minting, identity
//! resolution) live behind the seams in [`auth`].

/// External collaborator seams: token minting and identity resolution
pub mod auth;

/// Configuration management loaded from the environment
pub mod config;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// Structured logging configuration
pub mod logging;

/// OAuth 2.0 authorization server implementation
pub mod oauth2;
