// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SECRET: &str = "cookie-secret";

#[test]
fn round_trips_user_id() {
    let value = issue(SECRET, "usr-1", 2_000_000_000);
    assert_eq!(verify(SECRET, &value, 1_000_000_000).as_deref(), Some("usr-1"));
}

#[test]
fn user_ids_with_dots_survive() {
    let value = issue(SECRET, "user.with.dots", 2_000_000_000);
    assert_eq!(verify(SECRET, &value, 0).as_deref(), Some("user.with.dots"));
}

#[test]
fn rejects_expired() {
    let value = issue(SECRET, "usr-1", 1_000);
    assert!(verify(SECRET, &value, 1_000).is_none());
    assert!(verify(SECRET, &value, 1_001).is_none());
    assert!(verify(SECRET, &value, 999).is_some());
}

#[test]
fn rejects_wrong_secret() {
    let value = issue(SECRET, "usr-1", 2_000_000_000);
    assert!(verify("other-secret", &value, 0).is_none());
}

#[test]
fn rejects_tampered_payload() {
    let value = issue(SECRET, "usr-1", 2_000_000_000);
    // Swap in a different expiry without re-signing.
    let (payload, sig) = value.rsplit_once('.').unwrap_or_default();
    let mut parts: Vec<&str> = payload.split('.').collect();
    let bumped = "3000000000";
    parts[2] = bumped;
    let forged = format!("{}.{sig}", parts.join("."));
    assert!(verify(SECRET, &forged, 0).is_none());
}

#[test]
fn rejects_malformed_values() {
    assert!(verify(SECRET, "", 0).is_none());
    assert!(verify(SECRET, "v1", 0).is_none());
    assert!(verify(SECRET, "v2.dXNyLTE.100.sig", 0).is_none());
    assert!(verify(SECRET, "not a cookie at all", 0).is_none());
}
