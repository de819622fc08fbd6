// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Handles environment-driven configuration for the authorization core
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

//! Configuration module for the Arcadia auth server
//!
//! - **Environment**: Server configuration from environment variables

/// Environment and server configuration
pub mod environment;

pub use environment::ServerConfig;
