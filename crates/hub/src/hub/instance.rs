// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-gateway relay actor.
//!
//! One gateway duplex, many browser subscribers, a correlation table for
//! ack-tracked commands. Two send tiers toward the gateway:
//!
//! - realtime: no pending entry, no timeout, silently dropped when the
//!   gateway is away (`session.input`, `session.resize`, `session.ack`);
//! - ack-tracked: pending entry keyed by `request_id`, bounded by the
//!   command timeout, rejected en masse the moment the gateway link drops.
//!
//! Browser fan-out uses bounded per-subscriber channels with `try_send`;
//! a full channel marks the subscriber stale and evicts it rather than
//! letting one slow peer stall the frame loop.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use tether_proto::frame;
use tether_proto::message::{ClientMessage, Command, Event, ServerMessage, SnapshotRequest};
use tether_proto::SCHEMA_VERSION;

use crate::config::HubConfig;
use crate::error::{CommandError, HubError};
use crate::hub::lifecycle;
use crate::store::sessions::SessionStatus;
use crate::store::Store;

/// Standard close codes used on the WebSocket surface.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_POLICY: u16 = 1008;
/// Application code sent to a gateway socket displaced by a newer link.
pub const CLOSE_REPLACED: u16 = 4000;

/// Buffered frames per browser subscriber before it counts as stale.
const SUBSCRIBER_BUFFER: usize = 256;

/// Identifies a browser subscriber within one hub.
pub type SubscriberId = u64;

/// Message pushed toward a connected socket. The transport pump turns
/// these into WebSocket frames.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Arc<str>),
    Binary(Bytes),
    Close { code: u16, reason: &'static str },
}

/// Mailbox messages. Gateway-side entries carry the link epoch assigned
/// at attach so traffic from a displaced socket is ignored.
enum HubMsg {
    GatewayAttached { epoch: u64, tx: mpsc::UnboundedSender<Outbound> },
    GatewayText { epoch: u64, text: String },
    GatewayBinary { epoch: u64, bytes: Bytes },
    GatewayClosed { epoch: u64 },
    BrowserAttached { id: SubscriberId, session_id: String, user_id: String, tx: mpsc::Sender<Outbound> },
    BrowserText { id: SubscriberId, text: String },
    BrowserClosed { id: SubscriberId },
    Command {
        envelope: Command,
        source: Option<SubscriberId>,
        reply: oneshot::Sender<Result<Event, CommandError>>,
    },
    RegisterTransfer { transfer_id: String, tx: mpsc::UnboundedSender<Event> },
    UnregisterTransfer { transfer_id: String },
    CommandTimeout { request_id: String },
    GraceExpired { generation: u64 },
    Shutdown { reply: oneshot::Sender<()> },
    #[cfg(test)]
    Stats { reply: oneshot::Sender<HubStats> },
}

/// Snapshot of the actor's ephemeral maps, for tests only. A stats
/// round-trip also doubles as a mailbox barrier.
#[cfg(test)]
pub(crate) struct HubStats {
    pub gateway_connected: bool,
    pub subscribers: usize,
    pub sessions: usize,
    pub pending: usize,
    pub transfers: usize,
}

/// Handle to a running hub instance. Cheap to clone; all methods are
/// non-blocking except [`Hub::command`] and [`Hub::shutdown`].
#[derive(Clone)]
pub struct Hub {
    gateway_id: Arc<str>,
    tx: mpsc::UnboundedSender<HubMsg>,
    next_subscriber: Arc<AtomicU64>,
    next_epoch: Arc<AtomicU64>,
}

impl Hub {
    /// Spawn the actor task for one gateway identity.
    pub fn spawn(gateway_id: &str, config: HubConfig, store: Store) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = HubState {
            gateway_id: gateway_id.to_owned(),
            config,
            store,
            mailbox: tx.clone(),
            gateway: None,
            gateway_epoch: 0,
            grace_generation: 0,
            subscribers: HashMap::new(),
            by_session: HashMap::new(),
            pending: HashMap::new(),
            transfers: HashMap::new(),
        };
        tokio::spawn(run(state, rx));
        Self {
            gateway_id: Arc::from(gateway_id),
            tx,
            next_subscriber: Arc::new(AtomicU64::new(1)),
            next_epoch: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// True once the actor task has exited (after shutdown).
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Install a gateway link. Returns the epoch the transport must tag
    /// subsequent gateway traffic with.
    pub fn attach_gateway(&self, tx: mpsc::UnboundedSender<Outbound>) -> u64 {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(HubMsg::GatewayAttached { epoch, tx });
        epoch
    }

    pub fn gateway_text(&self, epoch: u64, text: String) {
        let _ = self.tx.send(HubMsg::GatewayText { epoch, text });
    }

    pub fn gateway_binary(&self, epoch: u64, bytes: Bytes) {
        let _ = self.tx.send(HubMsg::GatewayBinary { epoch, bytes });
    }

    pub fn gateway_closed(&self, epoch: u64) {
        let _ = self.tx.send(HubMsg::GatewayClosed { epoch });
    }

    /// Channel capacity expected for browser subscriber channels.
    pub fn subscriber_buffer() -> usize {
        SUBSCRIBER_BUFFER
    }

    /// Register a browser subscriber for a session.
    pub fn attach_browser(
        &self,
        session_id: &str,
        user_id: &str,
        tx: mpsc::Sender<Outbound>,
    ) -> SubscriberId {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(HubMsg::BrowserAttached {
            id,
            session_id: session_id.to_owned(),
            user_id: user_id.to_owned(),
            tx,
        });
        id
    }

    pub fn browser_text(&self, id: SubscriberId, text: String) {
        let _ = self.tx.send(HubMsg::BrowserText { id, text });
    }

    pub fn browser_closed(&self, id: SubscriberId) {
        let _ = self.tx.send(HubMsg::BrowserClosed { id });
    }

    /// Send an ack-tracked command and await its resolution: an `ack`
    /// for most commands, or the typed reply event for the snapshot,
    /// key-list, install, update, and create paths.
    pub async fn command(&self, envelope: Command) -> Result<Event, CommandError> {
        self.command_from(envelope, None).await
    }

    /// As [`Hub::command`], mirroring the resolution to a source
    /// subscriber socket.
    pub async fn command_from(
        &self,
        envelope: Command,
        source: Option<SubscriberId>,
    ) -> Result<Event, CommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(HubMsg::Command { envelope, source, reply: reply_tx }).is_err() {
            return Err(CommandError::new(HubError::Internal, "hub closed"));
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(CommandError::new(HubError::Internal, "hub closed")),
        }
    }

    /// Route `file.content.*` events for a transfer id to `tx` until the
    /// transfer ends or the gateway link drops.
    pub fn register_transfer(&self, transfer_id: &str, tx: mpsc::UnboundedSender<Event>) {
        let _ = self
            .tx
            .send(HubMsg::RegisterTransfer { transfer_id: transfer_id.to_owned(), tx });
    }

    pub fn unregister_transfer(&self, transfer_id: &str) {
        let _ = self.tx.send(HubMsg::UnregisterTransfer { transfer_id: transfer_id.to_owned() });
    }

    #[cfg(test)]
    pub(crate) async fn stats(&self) -> Option<HubStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(HubMsg::Stats { reply: reply_tx }).ok()?;
        reply_rx.await.ok()
    }

    /// Close the gateway link and every subscriber, reject all pending
    /// commands, and stop the actor. Idempotent.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(HubMsg::Shutdown { reply: reply_tx }).is_ok() {
            let _ = reply_rx.await;
        }
    }
}

// ── Actor state ───────────────────────────────────────────────────────

struct GatewaySlot {
    tx: mpsc::UnboundedSender<Outbound>,
}

struct Subscriber {
    tx: mpsc::Sender<Outbound>,
    session_id: String,
    user_id: String,
    last_activity: Instant,
}

struct PendingEntry {
    /// Absent for detached commands (snapshot-on-attach) whose
    /// resolution nobody awaits.
    reply: Option<oneshot::Sender<Result<Event, CommandError>>>,
    source: Option<SubscriberId>,
}

struct HubState {
    gateway_id: String,
    config: HubConfig,
    store: Store,
    mailbox: mpsc::UnboundedSender<HubMsg>,
    gateway: Option<GatewaySlot>,
    /// Epoch of the currently installed gateway link; messages tagged
    /// with an older epoch belong to a displaced socket.
    gateway_epoch: u64,
    grace_generation: u64,
    subscribers: HashMap<SubscriberId, Subscriber>,
    by_session: HashMap<String, HashSet<SubscriberId>>,
    pending: HashMap<String, PendingEntry>,
    transfers: HashMap<String, mpsc::UnboundedSender<Event>>,
}

async fn run(mut state: HubState, mut rx: mpsc::UnboundedReceiver<HubMsg>) {
    let mut sweep = tokio::time::interval(state.config.idle_sweep_interval());
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so the sweep
    // cadence starts one full period out.
    sweep.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(HubMsg::Shutdown { reply }) => {
                    state.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
                Some(msg) => state.handle(msg).await,
                None => {
                    state.shutdown().await;
                    break;
                }
            },
            _ = sweep.tick() => state.sweep_idle().await,
        }
    }
}

impl HubState {
    async fn handle(&mut self, msg: HubMsg) {
        match msg {
            HubMsg::GatewayAttached { epoch, tx } => self.on_gateway_attached(epoch, tx),
            HubMsg::GatewayText { epoch, text } => {
                if epoch == self.gateway_epoch {
                    self.on_gateway_text(text).await;
                }
            }
            HubMsg::GatewayBinary { epoch, bytes } => {
                if epoch == self.gateway_epoch {
                    self.on_gateway_binary(bytes);
                }
            }
            HubMsg::GatewayClosed { epoch } => {
                if epoch == self.gateway_epoch {
                    self.on_gateway_closed().await;
                }
            }
            HubMsg::BrowserAttached { id, session_id, user_id, tx } => {
                self.on_browser_attached(id, session_id, user_id, tx);
            }
            HubMsg::BrowserText { id, text } => self.on_browser_text(id, text),
            HubMsg::BrowserClosed { id } => self.remove_subscriber(id, None),
            HubMsg::Command { envelope, source, reply } => {
                self.on_command(envelope, source, Some(reply));
            }
            HubMsg::RegisterTransfer { transfer_id, tx } => {
                self.transfers.insert(transfer_id, tx);
            }
            HubMsg::UnregisterTransfer { transfer_id } => {
                self.transfers.remove(&transfer_id);
            }
            HubMsg::CommandTimeout { request_id } => self.on_command_timeout(&request_id),
            HubMsg::GraceExpired { generation } => self.on_grace_expired(generation).await,
            // Shutdown is handled by the run loop so it can stop the task.
            HubMsg::Shutdown { reply } => {
                let _ = reply.send(());
            }
            #[cfg(test)]
            HubMsg::Stats { reply } => {
                let _ = reply.send(HubStats {
                    gateway_connected: self.gateway.is_some(),
                    subscribers: self.subscribers.len(),
                    sessions: self.by_session.len(),
                    pending: self.pending.len(),
                    transfers: self.transfers.len(),
                });
            }
        }
    }

    // ── Gateway link ──────────────────────────────────────────────────

    fn on_gateway_attached(&mut self, epoch: u64, tx: mpsc::UnboundedSender<Outbound>) {
        if let Some(old) = self.gateway.take() {
            tracing::info!(gateway_id = %self.gateway_id, "gateway link replaced");
            let _ = old.tx.send(Outbound::Close { code: CLOSE_REPLACED, reason: "replaced" });
        }
        // A pending grace timer is void once a new link is installed.
        self.grace_generation += 1;
        self.gateway_epoch = epoch;
        self.gateway = Some(GatewaySlot { tx });
    }

    async fn on_gateway_text(&mut self, text: String) {
        if text.len() > self.config.max_text_bytes {
            tracing::warn!(
                gateway_id = %self.gateway_id,
                len = text.len(),
                "dropping oversize gateway text frame"
            );
            return;
        }
        let event: Event = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                // The gateway is the trusted peer: log and ignore.
                tracing::debug!(gateway_id = %self.gateway_id, err = %e, "unparseable gateway frame");
                return;
            }
        };

        match &event {
            Event::GatewayHello(hello) => {
                if hello.gateway_id != self.gateway_id {
                    tracing::warn!(
                        expected = %self.gateway_id,
                        claimed = %hello.gateway_id,
                        "hello gateway id mismatch, closing link"
                    );
                    if let Some(ref slot) = self.gateway {
                        let _ = slot.tx.send(Outbound::Close {
                            code: CLOSE_POLICY,
                            reason: "gateway id mismatch",
                        });
                    }
                    return;
                }
                lifecycle::on_hello(&self.store, &self.gateway_id, &hello.version).await;
            }
            Event::GatewayHealth(_) => {
                lifecycle::on_health(&self.store, &self.gateway_id).await;
            }
            Event::Ack(ack) => {
                let outcome = if ack.ok {
                    Ok(event.clone())
                } else {
                    Err(CommandError::failed(
                        ack.error.clone().unwrap_or_else(|| "command failed".to_owned()),
                    ))
                };
                self.resolve_pending(&ack.request_id, &text, outcome);
            }
            Event::SessionStarted(_) | Event::SessionEnded(_) | Event::SessionError(_) => {
                let status = match &event {
                    Event::SessionStarted(_) => SessionStatus::Running,
                    Event::SessionEnded(_) => SessionStatus::Ended,
                    _ => SessionStatus::Error,
                };
                if let Some(session_id) = event.session_id() {
                    let session_id = session_id.to_owned();
                    lifecycle::on_session_status(&self.store, &session_id, status).await;
                    if let Some(rid) = event.request_id().map(str::to_owned) {
                        self.resolve_pending(&rid, &text, Ok(event.clone()));
                    }
                    self.fan_out_text(&session_id, &text);
                }
            }
            Event::SessionSnapshot(snapshot) => {
                if let Some(rid) = snapshot.request_id.clone() {
                    self.resolve_pending(&rid, &text, Ok(event.clone()));
                }
                self.fan_out_text(&snapshot.session_id, &text);
            }
            Event::SshKeys(_) | Event::AgentInstalled(_) | Event::GatewayUpdated(_) => {
                // Request-scoped replies: resolve (and mirror) only.
                if let Some(rid) = event.request_id().map(str::to_owned) {
                    self.resolve_pending(&rid, &text, Ok(event.clone()));
                }
            }
            Event::FileContentBegin(_) | Event::FileContentChunk(_) | Event::FileContentEnd(_) => {
                self.route_transfer(&event);
            }
        }
    }

    fn on_gateway_binary(&mut self, bytes: Bytes) {
        let frame = match frame::decode_output(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(gateway_id = %self.gateway_id, err = %e, "undecodable binary frame");
                return;
            }
        };
        if frame.payload.len() > self.config.max_binary_bytes {
            tracing::warn!(
                gateway_id = %self.gateway_id,
                len = frame.payload.len(),
                "dropping oversize binary frame"
            );
            return;
        }
        let session_id = frame.session_id.to_owned();
        // Forward the raw bytes: subscribers re-decode, and this keeps
        // sequence bytes verbatim without a re-encode.
        self.fan_out_binary(&session_id, bytes);
    }

    async fn on_gateway_closed(&mut self) {
        if self.gateway.take().is_none() {
            return;
        }
        // Reject every pending waiter before anything else can run: the
        // drain and the slot clearing above happen with no await between
        // them, so no reconnect can observe a half-torn link.
        let drained: Vec<PendingEntry> = self.pending.drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            if let Some(reply) = entry.reply {
                let _ = reply.send(Err(CommandError::disconnected()));
            }
        }
        self.transfers.clear();

        tracing::info!(gateway_id = %self.gateway_id, "gateway link closed");
        lifecycle::on_disconnected(&self.store, &self.gateway_id).await;

        self.grace_generation += 1;
        let generation = self.grace_generation;
        let mailbox = self.mailbox.clone();
        let grace = self.config.grace_period();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = mailbox.send(HubMsg::GraceExpired { generation });
        });
    }

    async fn on_grace_expired(&mut self, generation: u64) {
        if generation != self.grace_generation || self.gateway.is_some() {
            return;
        }
        // Re-assert the disconnect; outstanding callers were already
        // rejected when the link dropped.
        lifecycle::on_disconnected(&self.store, &self.gateway_id).await;
    }

    // ── Browser link ──────────────────────────────────────────────────

    fn on_browser_attached(
        &mut self,
        id: SubscriberId,
        session_id: String,
        user_id: String,
        tx: mpsc::Sender<Outbound>,
    ) {
        tracing::debug!(
            gateway_id = %self.gateway_id,
            session_id = %session_id,
            user_id = %user_id,
            subscriber = id,
            "browser attached"
        );
        self.by_session.entry(session_id.clone()).or_default().insert(id);
        self.subscribers
            .insert(id, Subscriber { tx, session_id: session_id.clone(), user_id, last_activity: Instant::now() });

        // Bootstrap the late joiner: ask the gateway for a snapshot. The
        // reply is not awaited; it reaches this subscriber through the
        // ordinary session.snapshot fan-out.
        let envelope = Command::SessionSnapshot(SnapshotRequest {
            schema_version: SCHEMA_VERSION.to_owned(),
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            session_id,
        });
        self.on_command(envelope, None, None);
    }

    fn on_browser_text(&mut self, id: SubscriberId, text: String) {
        if text.len() > self.config.max_text_bytes {
            self.send_server_message(
                id,
                &ServerMessage::Error {
                    code: HubError::PayloadTooLarge.as_str().to_owned(),
                    message: "text frame exceeds limit".to_owned(),
                },
            );
            self.remove_subscriber(
                id,
                Some(Outbound::Close { code: CLOSE_POLICY, reason: "payload too large" }),
            );
            return;
        }

        if let Some(subscriber) = self.subscribers.get_mut(&id) {
            subscriber.last_activity = Instant::now();
        } else {
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => {
                self.send_server_message(
                    id,
                    &ServerMessage::Error {
                        code: HubError::InvalidPayload.as_str().to_owned(),
                        message: "malformed JSON".to_owned(),
                    },
                );
                return;
            }
        };

        match serde_json::from_value::<ClientMessage>(value) {
            Ok(ClientMessage::SessionInput(input)) => {
                self.send_realtime(&Command::SessionInput(input));
            }
            Ok(ClientMessage::SessionResize(resize)) => {
                self.send_realtime(&Command::SessionResize(resize));
            }
            Ok(ClientMessage::SessionAck(ack)) => {
                self.send_realtime(&Command::SessionAck(ack));
            }
            Ok(ClientMessage::Ping) => {
                self.send_server_message(id, &ServerMessage::Pong);
            }
            Err(_) => {
                self.send_server_message(
                    id,
                    &ServerMessage::Error {
                        code: "unknown_type".to_owned(),
                        message: "unrecognized message type".to_owned(),
                    },
                );
            }
        }
    }

    fn remove_subscriber(&mut self, id: SubscriberId, close: Option<Outbound>) {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return;
        };
        if let Some(close) = close {
            let _ = subscriber.tx.try_send(close);
        }
        if let Some(set) = self.by_session.get_mut(&subscriber.session_id) {
            set.remove(&id);
            if set.is_empty() {
                self.by_session.remove(&subscriber.session_id);
            }
        }
    }

    async fn sweep_idle(&mut self) {
        let idle_after = self.config.idle_timeout();
        let now = Instant::now();
        let stale: Vec<(SubscriberId, String)> = self
            .subscribers
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_activity) > idle_after)
            .map(|(id, s)| (*id, s.user_id.clone()))
            .collect();
        for (id, user_id) in stale {
            tracing::debug!(
                gateway_id = %self.gateway_id,
                subscriber = id,
                user_id = %user_id,
                "evicting idle subscriber"
            );
            self.remove_subscriber(
                id,
                Some(Outbound::Close { code: CLOSE_NORMAL, reason: "idle" }),
            );
        }

        // Flush subscriber liveness into the session rows: any session
        // that saw traffic since the previous sweep keeps a fresh
        // last-activity stamp without a store write per input frame.
        let recent = self.config.idle_sweep_interval();
        let mut live: Vec<String> = Vec::new();
        for subscriber in self.subscribers.values() {
            if now.duration_since(subscriber.last_activity) <= recent
                && !live.contains(&subscriber.session_id)
            {
                live.push(subscriber.session_id.clone());
            }
        }
        for session_id in live {
            lifecycle::on_session_activity(&self.store, &session_id).await;
        }
    }

    // ── Command discipline ────────────────────────────────────────────

    /// Fire-and-forget tier: no pending entry, no timeout; dropped
    /// silently when the gateway is away.
    fn send_realtime(&self, envelope: &Command) {
        let Some(ref slot) = self.gateway else {
            return;
        };
        match serde_json::to_string(envelope) {
            Ok(json) => {
                let _ = slot.tx.send(Outbound::Text(Arc::from(json)));
            }
            Err(e) => tracing::warn!(err = %e, "failed to serialize realtime command"),
        }
    }

    /// Ack-tracked tier. `reply = None` is a detached send (the snapshot
    /// issued at browser attach): the entry still exists for timeout
    /// bookkeeping, but nobody awaits it.
    fn on_command(
        &mut self,
        envelope: Command,
        source: Option<SubscriberId>,
        reply: Option<oneshot::Sender<Result<Event, CommandError>>>,
    ) {
        let reject = |reply: Option<oneshot::Sender<Result<Event, CommandError>>>,
                      err: CommandError| {
            if let Some(reply) = reply {
                let _ = reply.send(Err(err));
            }
        };

        let Some(request_id) = envelope.request_id().map(str::to_owned) else {
            reject(
                reply,
                CommandError::new(HubError::InvalidPayload, "realtime command has no ack"),
            );
            return;
        };
        if self.pending.contains_key(&request_id) {
            reject(
                reply,
                CommandError::new(HubError::InvalidPayload, "request id already in flight"),
            );
            return;
        }
        let Some(ref slot) = self.gateway else {
            reject(reply, CommandError::not_connected());
            return;
        };

        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                reject(reply, CommandError::new(HubError::Internal, format!("serialize: {e}")));
                return;
            }
        };

        // Pending insertion and the timeout arm happen before the write
        // so a synchronously failing transport still cleans up.
        self.pending.insert(request_id.clone(), PendingEntry { reply, source });
        let mailbox = self.mailbox.clone();
        let timeout = self.config.command_timeout();
        let timeout_rid = request_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = mailbox.send(HubMsg::CommandTimeout { request_id: timeout_rid });
        });

        if slot.tx.send(Outbound::Text(Arc::from(json))).is_err() {
            // Writer pump is gone; the close event is still in flight.
            if let Some(entry) = self.pending.remove(&request_id) {
                if let Some(reply) = entry.reply {
                    let _ = reply.send(Err(CommandError::disconnected()));
                }
            }
        }
    }

    fn on_command_timeout(&mut self, request_id: &str) {
        if let Some(entry) = self.pending.remove(request_id) {
            tracing::debug!(gateway_id = %self.gateway_id, request_id, "command timed out");
            if let Some(reply) = entry.reply {
                let _ = reply.send(Err(CommandError::timeout()));
            }
        }
    }

    /// Remove a pending entry, mirror the raw reply to its source
    /// subscriber, and resolve the waiter. At most one resolve-or-reject
    /// per request id: the entry is gone after this.
    fn resolve_pending(
        &mut self,
        request_id: &str,
        raw: &str,
        outcome: Result<Event, CommandError>,
    ) {
        let Some(entry) = self.pending.remove(request_id) else {
            return;
        };
        if let Some(source) = entry.source {
            if let Some(subscriber) = self.subscribers.get(&source) {
                let _ = subscriber.tx.try_send(Outbound::Text(Arc::from(raw)));
            }
        }
        if let Some(reply) = entry.reply {
            let _ = reply.send(outcome);
        }
    }

    fn route_transfer(&mut self, event: &Event) {
        let Some(transfer_id) = event.transfer_id().map(str::to_owned) else {
            return;
        };
        let done = matches!(event, Event::FileContentEnd(_));
        match self.transfers.get(&transfer_id) {
            Some(tx) => {
                if tx.send(event.clone()).is_err() {
                    self.transfers.remove(&transfer_id);
                } else if done {
                    self.transfers.remove(&transfer_id);
                }
            }
            None => {
                tracing::debug!(transfer_id = %transfer_id, "dropping unrouted file content event");
            }
        }
    }

    // ── Fan-out ───────────────────────────────────────────────────────

    fn fan_out_text(&mut self, session_id: &str, text: &str) {
        let shared: Arc<str> = Arc::from(text);
        self.fan_out(session_id, &Outbound::Text(shared));
    }

    fn fan_out_binary(&mut self, session_id: &str, bytes: Bytes) {
        self.fan_out(session_id, &Outbound::Binary(bytes));
    }

    /// Forward-only iteration with non-blocking sends: per-subscriber
    /// order is arrival order, and a full channel evicts its subscriber
    /// instead of stalling the loop. Evicted peers recover through the
    /// snapshot they pull on reattach.
    fn fan_out(&mut self, session_id: &str, msg: &Outbound) {
        let Some(ids) = self.by_session.get(session_id) else {
            return;
        };
        let mut stale: Vec<SubscriberId> = Vec::new();
        for id in ids {
            let Some(subscriber) = self.subscribers.get(id) else {
                continue;
            };
            if subscriber.tx.try_send(msg.clone()).is_err() {
                stale.push(*id);
            }
        }
        for id in stale {
            tracing::warn!(
                gateway_id = %self.gateway_id,
                subscriber = id,
                "evicting stale subscriber (send buffer full)"
            );
            self.remove_subscriber(
                id,
                Some(Outbound::Close { code: CLOSE_GOING_AWAY, reason: "too slow" }),
            );
        }
    }

    fn send_server_message(&self, id: SubscriberId, msg: &ServerMessage) {
        let Some(subscriber) = self.subscribers.get(&id) else {
            return;
        };
        if let Ok(json) = serde_json::to_string(msg) {
            let _ = subscriber.tx.try_send(Outbound::Text(Arc::from(json)));
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────

    async fn shutdown(&mut self) {
        if let Some(slot) = self.gateway.take() {
            let _ = slot.tx.send(Outbound::Close { code: CLOSE_GOING_AWAY, reason: "shutdown" });
        }
        for (_, subscriber) in self.subscribers.drain() {
            let _ = subscriber
                .tx
                .try_send(Outbound::Close { code: CLOSE_GOING_AWAY, reason: "shutdown" });
        }
        self.by_session.clear();
        self.transfers.clear();
        for (_, entry) in self.pending.drain() {
            if let Some(reply) = entry.reply {
                let _ = reply.send(Err(CommandError::new(
                    HubError::GatewayDisconnected,
                    "hub shutdown",
                )));
            }
        }
        lifecycle::on_disconnected(&self.store, &self.gateway_id).await;
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
