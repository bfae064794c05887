// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translation of hub events into metadata-store writes.
//!
//! The hub task calls these at lifecycle edges: first hello, health
//! beacons, link loss, session status changes. Store failures are logged
//! and swallowed — a flaky database must not tear down a healthy relay.

use crate::store::sessions::SessionStatus;
use crate::store::Store;

/// First valid hello on a link: record version, mark connected, and
/// activate the owning host if it is still provisioning. Idempotent.
pub(crate) async fn on_hello(store: &Store, gateway_id: &str, version: &str) {
    if let Err(e) = store.gateway_hello(gateway_id, version).await {
        tracing::warn!(gateway_id, err = %e, "failed to persist gateway hello");
    } else {
        tracing::info!(gateway_id, version, "gateway connected");
    }
}

/// Health beacon: refresh last-seen.
pub(crate) async fn on_health(store: &Store, gateway_id: &str) {
    if let Err(e) = store.update_gateway_last_seen(gateway_id).await {
        tracing::warn!(gateway_id, err = %e, "failed to persist gateway health");
    }
}

/// Link loss (or grace re-assertion): mark not connected.
pub(crate) async fn on_disconnected(store: &Store, gateway_id: &str) {
    if let Err(e) = store.update_gateway_connected(gateway_id, false).await {
        tracing::warn!(gateway_id, err = %e, "failed to persist gateway disconnect");
    }
}

/// Session status transition reported by the gateway.
pub(crate) async fn on_session_status(store: &Store, session_id: &str, status: SessionStatus) {
    if let Err(e) = store.update_session_status(session_id, status).await {
        tracing::warn!(session_id, err = %e, "failed to persist session status");
    }
}

/// Liveness flush from the idle sweep: a session with recently active
/// subscribers keeps a fresh last-activity stamp.
pub(crate) async fn on_session_activity(store: &Store, session_id: &str) {
    if let Err(e) = store.touch_session(session_id).await {
        tracing::warn!(session_id, err = %e, "failed to persist session activity");
    }
}
