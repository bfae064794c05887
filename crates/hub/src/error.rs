// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy for the hub API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    Unauthorized,
    NotFound,
    InvalidPayload,
    PayloadTooLarge,
    IdentityConflict,
    GatewayDisconnected,
    Timeout,
    CommandFailed,
    ProviderFailure,
    Internal,
}

impl HubError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::InvalidPayload => 400,
            Self::PayloadTooLarge => 413,
            Self::IdentityConflict => 409,
            Self::GatewayDisconnected | Self::Timeout | Self::CommandFailed => 502,
            Self::ProviderFailure => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::InvalidPayload => "invalid_payload",
            Self::PayloadTooLarge => "payload_too_large",
            Self::IdentityConflict => "identity_conflict",
            Self::GatewayDisconnected => "gateway_disconnected",
            Self::Timeout => "timeout",
            Self::CommandFailed => "command_failed",
            Self::ProviderFailure => "provider_failure",
            Self::Internal => "internal",
        }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: message.into() }))
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP error body. Callers receive `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed ack-tracked command: taxonomy kind plus the human message
/// surfaced to HTTP callers.
#[derive(Debug, Clone)]
pub struct CommandError {
    pub kind: HubError,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: HubError, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn disconnected() -> Self {
        Self::new(HubError::GatewayDisconnected, "gateway disconnected")
    }

    pub fn not_connected() -> Self {
        Self::new(HubError::GatewayDisconnected, "gateway not connected")
    }

    pub fn timeout() -> Self {
        Self::new(HubError::Timeout, "command timed out")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(HubError::CommandFailed, message)
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        self.kind.to_http_response(self.message.clone())
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for CommandError {}
