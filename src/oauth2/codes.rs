// ABOUTME: Cryptographically secure code generation for authorization codes and device flow pairs
// ABOUTME: Maps CSPRNG output onto restricted charsets with rejection sampling to avoid modulo bias
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Arcadia Preservation Project

use crate::errors::{AppError, AppResult};
use ring::rand::{SecureRandom, SystemRandom};

/// Wide alphabet for machine-held secrets (authorization codes, device
/// codes, client secrets)
pub const WIDE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Restricted alphabet for human-typed user codes: consonants that stay
/// unambiguous when handwritten or read aloud
pub const USER_CODE_CHARSET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Generate a random code of `length` characters drawn uniformly from `charset`
///
/// # Errors
/// Returns an error if the system RNG fails; the server cannot operate
/// securely without working randomness
pub fn random_code(charset: &[u8], length: usize) -> AppResult<String> {
    debug_assert!(!charset.is_empty() && charset.len() <= 256);
    let rng = SystemRandom::new();

    // Largest multiple of the charset size that fits in a byte; bytes at or
    // above it are rejected so every character stays equally likely
    #[allow(clippy::cast_possible_truncation)]
    let limit = (256 / charset.len() * charset.len()) as u16;

    let mut out = Vec::with_capacity(length);
    let mut buf = [0u8; 64];
    while out.len() < length {
        rng.fill(&mut buf).map_err(|_| {
            tracing::error!("system RNG failure while generating code");
            AppError::internal("system RNG failure")
        })?;
        for byte in buf {
            if u16::from(byte) < limit {
                out.push(charset[usize::from(byte) % charset.len()]);
                if out.len() == length {
                    break;
                }
            }
        }
    }

    // Charsets are ASCII by construction
    String::from_utf8(out).map_err(|e| AppError::internal("generated non-ASCII code").with_source(e))
}
