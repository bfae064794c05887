// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON envelopes for the hub ↔ gateway duplex and the browser link.
//!
//! All text frames are objects with a top-level `type` discriminator.
//! Commands flow hub → gateway; events flow gateway → hub. Realtime
//! commands (`session.input`, `session.resize`, `session.ack`) carry no
//! `request_id` and are never acked; everything else is ack-tracked and
//! resolves on an [`Event::Ack`] or on the typed reply noted per variant.

use serde::{Deserialize, Serialize};

use crate::SCHEMA_VERSION;

fn schema_version_default() -> String {
    SCHEMA_VERSION.to_owned()
}

// ── Shared sub-types ──────────────────────────────────────────────────

/// Hardware/OS block reported in `gateway.hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: u32,
    pub ram_total_bytes: u64,
    pub disk_total_bytes: u64,
}

/// One authorized key as reported by `ssh.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeyInfo {
    pub fingerprint: String,
    pub public_key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

// ── Commands (hub → gateway) ──────────────────────────────────────────

/// Start a terminal session. Resolved by `session.started` (or a negative
/// ack if the gateway cannot spawn it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreate {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub session_id: String,
    pub name: String,
    pub workdir: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<serde_json::Value>,
}

/// Keystrokes for a session. Realtime, no ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInput {
    pub session_id: String,
    /// Base64-encoded raw bytes.
    pub data: String,
}

/// Terminal geometry change. Realtime, no ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResize {
    pub session_id: String,
    pub cols: u16,
    pub rows: u16,
}

/// Subscriber flow-control cursor. Realtime, no ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAck {
    pub session_id: String,
    pub seq: u64,
}

/// Terminate a session. Acked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnd {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub session_id: String,
}

/// Request a terminal snapshot. Resolved by a `session.snapshot` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub session_id: String,
}

/// Install a public key on the host. Acked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshAuthorize {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub public_key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Remove a key by fingerprint. Acked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshRevoke {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub fingerprint: String,
}

/// List installed keys. Resolved by an `ssh.keys` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshList {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
}

/// Begin a file upload toward the host. Acked; content chunks follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadBegin {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub transfer_id: String,
    pub path: String,
    pub size: u64,
}

/// One upload chunk. Acked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadChunk {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub transfer_id: String,
    /// Base64-encoded chunk bytes.
    pub data: String,
}

/// Close out an upload. Acked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadEnd {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub transfer_id: String,
}

/// Ask the gateway to stream a file back. Acked; `file.content.*` events
/// follow, routed by `transfer_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDownload {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub transfer_id: String,
    pub path: String,
}

/// Abort an in-flight transfer in either direction. Acked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCancel {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub transfer_id: String,
}

/// Install an agent binary on the host. Resolved by `agent.installed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentsInstall {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub agent: String,
}

/// Self-update the gateway binary. Resolved by `gateway.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayUpdate {
    #[serde(default = "schema_version_default")]
    pub schema_version: String,
    pub request_id: String,
    pub url: String,
    pub sha256: String,
    pub version: String,
}

/// Every command the hub can send to a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "session.create")]
    SessionCreate(SessionCreate),
    #[serde(rename = "session.input")]
    SessionInput(SessionInput),
    #[serde(rename = "session.resize")]
    SessionResize(SessionResize),
    #[serde(rename = "session.ack")]
    SessionAck(SessionAck),
    #[serde(rename = "session.end")]
    SessionEnd(SessionEnd),
    #[serde(rename = "session.snapshot")]
    SessionSnapshot(SnapshotRequest),
    #[serde(rename = "ssh.authorize")]
    SshAuthorize(SshAuthorize),
    #[serde(rename = "ssh.revoke")]
    SshRevoke(SshRevoke),
    #[serde(rename = "ssh.list")]
    SshList(SshList),
    #[serde(rename = "file.upload.begin")]
    FileUploadBegin(FileUploadBegin),
    #[serde(rename = "file.upload.chunk")]
    FileUploadChunk(FileUploadChunk),
    #[serde(rename = "file.upload.end")]
    FileUploadEnd(FileUploadEnd),
    #[serde(rename = "file.download")]
    FileDownload(FileDownload),
    #[serde(rename = "file.cancel")]
    FileCancel(FileCancel),
    #[serde(rename = "agents.install")]
    AgentsInstall(AgentsInstall),
    #[serde(rename = "gateway.update")]
    GatewayUpdate(GatewayUpdate),
}

impl Command {
    /// The correlation id, absent for realtime commands.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::SessionInput(_) | Self::SessionResize(_) | Self::SessionAck(_) => None,
            Self::SessionCreate(c) => Some(&c.request_id),
            Self::SessionEnd(c) => Some(&c.request_id),
            Self::SessionSnapshot(c) => Some(&c.request_id),
            Self::SshAuthorize(c) => Some(&c.request_id),
            Self::SshRevoke(c) => Some(&c.request_id),
            Self::SshList(c) => Some(&c.request_id),
            Self::FileUploadBegin(c) => Some(&c.request_id),
            Self::FileUploadChunk(c) => Some(&c.request_id),
            Self::FileUploadEnd(c) => Some(&c.request_id),
            Self::FileDownload(c) => Some(&c.request_id),
            Self::FileCancel(c) => Some(&c.request_id),
            Self::AgentsInstall(c) => Some(&c.request_id),
            Self::GatewayUpdate(c) => Some(&c.request_id),
        }
    }

    /// True for the fire-and-forget tier (no pending entry, no timeout).
    pub fn is_realtime(&self) -> bool {
        self.request_id().is_none()
    }
}

// ── Events (gateway → hub) ────────────────────────────────────────────

/// Generic command acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// First event on a fresh gateway link. `gateway_id` must match the
/// identity the router authenticated; a mismatch closes the link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayHello {
    pub gateway_id: String,
    pub version: String,
    pub system_info: SystemInfo,
    /// Only meaningful during a first-time manual attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_token: Option<String>,
}

/// Periodic liveness beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayHealth {
    #[serde(default)]
    pub uptime_secs: u64,
}

/// A session reached `running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStarted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub session_id: String,
}

/// A session exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// A session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionErrored {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub session_id: String,
    pub error: String,
}

/// Rendered terminal content for late-joining subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub session_id: String,
    /// Base64-encoded terminal content including escape sequences.
    pub data: String,
    pub cols: u16,
    pub rows: u16,
    /// Sequence number the snapshot is current through.
    pub seq: u64,
}

/// Reply to `ssh.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeys {
    pub request_id: String,
    pub keys: Vec<SshKeyInfo>,
}

/// Start of a streamed file download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContentBegin {
    pub transfer_id: String,
    pub size: u64,
}

/// One chunk of a streamed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContentChunk {
    pub transfer_id: String,
    /// Base64-encoded chunk bytes.
    pub data: String,
}

/// End of a streamed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContentEnd {
    pub transfer_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to `agents.install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInstalled {
    pub request_id: String,
    pub agent: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to `gateway.update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayUpdated {
    pub request_id: String,
    pub version: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every event a gateway can send to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "ack")]
    Ack(Ack),
    #[serde(rename = "gateway.hello")]
    GatewayHello(GatewayHello),
    #[serde(rename = "gateway.health")]
    GatewayHealth(GatewayHealth),
    #[serde(rename = "session.started")]
    SessionStarted(SessionStarted),
    #[serde(rename = "session.ended")]
    SessionEnded(SessionEnded),
    #[serde(rename = "session.error")]
    SessionError(SessionErrored),
    #[serde(rename = "session.snapshot")]
    SessionSnapshot(SessionSnapshot),
    #[serde(rename = "ssh.keys")]
    SshKeys(SshKeys),
    #[serde(rename = "file.content.begin")]
    FileContentBegin(FileContentBegin),
    #[serde(rename = "file.content.chunk")]
    FileContentChunk(FileContentChunk),
    #[serde(rename = "file.content.end")]
    FileContentEnd(FileContentEnd),
    #[serde(rename = "agent.installed")]
    AgentInstalled(AgentInstalled),
    #[serde(rename = "gateway.updated")]
    GatewayUpdated(GatewayUpdated),
}

impl Event {
    /// The session this event concerns, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionStarted(e) => Some(&e.session_id),
            Self::SessionEnded(e) => Some(&e.session_id),
            Self::SessionError(e) => Some(&e.session_id),
            Self::SessionSnapshot(e) => Some(&e.session_id),
            _ => None,
        }
    }

    /// The correlation id carried by this event, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Ack(e) => Some(&e.request_id),
            Self::SessionStarted(e) => e.request_id.as_deref(),
            Self::SessionEnded(e) => e.request_id.as_deref(),
            Self::SessionError(e) => e.request_id.as_deref(),
            Self::SessionSnapshot(e) => e.request_id.as_deref(),
            Self::SshKeys(e) => Some(&e.request_id),
            Self::AgentInstalled(e) => Some(&e.request_id),
            Self::GatewayUpdated(e) => Some(&e.request_id),
            _ => None,
        }
    }

    /// The transfer id for file-content events.
    pub fn transfer_id(&self) -> Option<&str> {
        match self {
            Self::FileContentBegin(e) => Some(&e.transfer_id),
            Self::FileContentChunk(e) => Some(&e.transfer_id),
            Self::FileContentEnd(e) => Some(&e.transfer_id),
            _ => None,
        }
    }
}

// ── Browser link messages ─────────────────────────────────────────────

/// Messages a browser subscriber may send. Validated before relay; the
/// first three map 1:1 onto realtime [`Command`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.input")]
    SessionInput(SessionInput),
    #[serde(rename = "session.resize")]
    SessionResize(SessionResize),
    #[serde(rename = "session.ack")]
    SessionAck(SessionAck),
    #[serde(rename = "ping")]
    Ping,
}

/// Structured replies the hub sends down a browser socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
