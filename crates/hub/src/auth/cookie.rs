// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HMAC-signed browser session cookies.
//!
//! Wire form: `v1.<user_id b64url>.<expires unix-secs>.<sig b64url>`,
//! where the signature covers the first three segments. The user id is
//! base64url-encoded so the dot-separated layout stays unambiguous.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;

/// Cookie name used by the router.
pub const COOKIE_NAME: &str = "tether_session";

/// Issue a signed cookie value for a user, valid until `expires`.
pub fn issue(secret: &str, user_id: &str, expires: i64) -> String {
    let payload = format!("v1.{}.{expires}", URL_SAFE_NO_PAD.encode(user_id));
    let sig = sign(secret, &payload);
    format!("{payload}.{sig}")
}

/// Verify a cookie value. Returns the user id on success; rejects bad
/// layout, bad signature, and expiry (checked after the signature so the
/// timing of the comparison never depends on attacker-controlled bytes).
pub fn verify(secret: &str, value: &str, now: i64) -> Option<String> {
    let (payload, sig) = value.rsplit_once('.')?;
    let mut parts = payload.split('.');
    let version = parts.next()?;
    let user_b64 = parts.next()?;
    let expires: i64 = parts.next()?.parse().ok()?;
    if version != "v1" || parts.next().is_some() {
        return None;
    }

    let expected = sign(secret, payload);
    ring::constant_time::verify_slices_are_equal(expected.as_bytes(), sig.as_bytes()).ok()?;

    if expires <= now {
        return None;
    }

    let user_bytes = URL_SAFE_NO_PAD.decode(user_b64).ok()?;
    String::from_utf8(user_bytes).ok()
}

fn sign(secret: &str, payload: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    URL_SAFE_NO_PAD.encode(hmac::sign(&key, payload.as_bytes()).as_ref())
}

#[cfg(test)]
#[path = "cookie_tests.rs"]
mod tests;
