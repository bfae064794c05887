// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-level authentication guards.
//!
//! Gateways present a bearer token checked against the stored keyed MAC.
//! Browsers present a signed session cookie; in dev mode the `x-dev-user`
//! header is honored instead. Both checks are constant-time underneath.

use axum::http::HeaderMap;

use crate::auth::{cookie, token};
use crate::config::AuthMode;
use crate::error::HubError;
use crate::state::AppState;
use crate::store::gateways::Gateway;
use crate::store::now_ts;

/// Header consulted only when `auth_mode = dev`.
pub const DEV_USER_HEADER: &str = "x-dev-user";

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Authenticate a gateway upgrade: look up the stored hash for the path's
/// gateway id and verify the presented token in constant time. Any
/// mismatch is a 401 before any hub instance is contacted.
pub async fn authenticate_gateway(
    state: &AppState,
    gateway_id: &str,
    headers: &HeaderMap,
) -> Result<Gateway, HubError> {
    let presented = bearer(headers).ok_or(HubError::Unauthorized)?;
    let gateway = state
        .store
        .get_gateway(gateway_id)
        .await
        .map_err(|_| HubError::Internal)?
        .ok_or(HubError::Unauthorized)?;
    if !token::verify_token(&state.config.gateway_token_salt, presented, &gateway.auth_token_hash)
    {
        return Err(HubError::Unauthorized);
    }
    Ok(gateway)
}

/// Authenticate a browser request, returning the user id.
pub fn authenticate_user(state: &AppState, headers: &HeaderMap) -> Result<String, HubError> {
    if state.config.auth_mode == AuthMode::Dev {
        if let Some(user) = headers.get(DEV_USER_HEADER).and_then(|v| v.to_str().ok()) {
            if !user.is_empty() {
                return Ok(user.to_owned());
            }
        }
    }

    let header = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .ok_or(HubError::Unauthorized)?;
    let value = header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie::COOKIE_NAME)
        .map(|(_, value)| value)
        .ok_or(HubError::Unauthorized)?;

    cookie::verify(&state.config.session_cookie_secret, value, now_ts())
        .ok_or(HubError::Unauthorized)
}
