// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated encryption for cloud provider tokens at rest.
//!
//! AES-256-GCM keyed by the process-wide KEK. Sealed layout:
//! `[version u8][nonce 12 bytes][ciphertext + tag]` with a fresh random
//! nonce per write. The version byte is what allows key rotation: a new
//! KEK bumps the version and old rows stay readable during migration.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Version byte written in front of every sealed blob.
pub const SEAL_VERSION: u8 = 1;

/// Process-wide key-encryption key.
pub struct Kek {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Kek {
    /// Build from the configured base64 key material (must decode to
    /// exactly 32 bytes).
    pub fn from_base64(encoded: &str) -> anyhow::Result<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        anyhow::ensure!(bytes.len() == 32, "host token KEK must be 32 bytes, got {}", bytes.len());
        let key = UnboundKey::new(&AES_256_GCM, &bytes)
            .map_err(|_| anyhow::anyhow!("invalid AES-256-GCM key"))?;
        Ok(Self { key: LessSafeKey::new(key), rng: SystemRandom::new() })
    }

    /// Seal a plaintext. Two seals of the same plaintext yield distinct
    /// blobs (random nonce).
    pub fn seal(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce_bytes).map_err(|_| anyhow::anyhow!("system rng failure"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut out = Vec::with_capacity(1 + NONCE_LEN + plaintext.len() + AES_256_GCM.tag_len());
        out.push(SEAL_VERSION);
        out.extend_from_slice(&nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| anyhow::anyhow!("seal failure"))?;
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    /// Open a sealed blob. Fails on version mismatch, truncation, or a
    /// wrong key (tag mismatch).
    pub fn open(&self, sealed: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::ensure!(sealed.len() > 1 + NONCE_LEN, "sealed blob truncated");
        anyhow::ensure!(sealed[0] == SEAL_VERSION, "unknown seal version {}", sealed[0]);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&sealed[1..1 + NONCE_LEN]);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = sealed[1 + NONCE_LEN..].to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| anyhow::anyhow!("decryption failure"))?;
        Ok(plain.to_vec())
    }
}

#[cfg(test)]
#[path = "crypt_tests.rs"]
mod tests;
