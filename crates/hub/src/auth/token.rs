// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway bearer tokens: minting, keyed hashing, constant-time verify.
//!
//! The store keeps only `token_hash(salt, plaintext)`; the plaintext is
//! handed to the gateway once at provision time and never persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};

use super::hex_encode;

/// Mint a fresh 256-bit bearer token, base64url without padding.
pub fn mint_token() -> anyhow::Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes).map_err(|_| anyhow::anyhow!("system rng failure"))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Keyed MAC of a token plaintext, hex-encoded. Deterministic for a given
/// salt, so lookups can compare stored hashes directly.
pub fn token_hash(salt: &str, token: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, salt.as_bytes());
    let tag = hmac::sign(&key, token.as_bytes());
    hex_encode(tag.as_ref())
}

/// Verify a presented plaintext against a stored hash in constant time.
pub fn verify_token(salt: &str, token: &str, stored_hash: &str) -> bool {
    let computed = token_hash(salt, token);
    ring::constant_time::verify_slices_are_equal(computed.as_bytes(), stored_hash.as_bytes())
        .is_ok()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
