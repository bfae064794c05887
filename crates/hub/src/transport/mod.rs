// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket surface in front of the hubs.

pub mod auth;
pub mod browser_ws;
pub mod gateway_ws;
pub mod http;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with all hub routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Gateway duplex
        .route("/gw/connect/{gateway_id}", get(gateway_ws::gateway_connect))
        // Generic hub command entrypoint
        .route("/gw/{gateway_id}/command", post(http::gateway_command))
        // Identity + credentials
        .route("/auth/resolve", post(http::resolve_identity))
        .route("/credentials", post(http::put_credentials))
        // Hosts
        .route("/hosts", post(http::create_host).get(http::list_hosts))
        .route("/hosts/{host_id}", get(http::get_host).delete(http::delete_host))
        // Browser terminal duplex
        .route("/hosts/{host_id}/terminal", get(browser_ws::terminal_connect))
        // Sessions
        .route("/hosts/{host_id}/sessions", post(http::create_session))
        .route(
            "/hosts/{host_id}/sessions/{session_id}",
            delete(http::end_session),
        )
        .route(
            "/hosts/{host_id}/sessions/{session_id}/snapshot",
            get(http::session_snapshot),
        )
        // SSH keys
        .route("/hosts/{host_id}/keys", post(http::authorize_key).get(http::list_keys))
        .route("/hosts/{host_id}/keys/{fingerprint}", delete(http::revoke_key))
        // Middleware
        .layer(CorsLayer::permissive())
        .with_state(state)
}
