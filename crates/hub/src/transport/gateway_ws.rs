// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway-side WebSocket upgrade and socket pump.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::{Hub, Outbound};
use crate::state::AppState;
use crate::transport::auth;

/// `GET /gw/connect/{gateway_id}` — the single gateway duplex.
pub async fn gateway_connect(
    State(state): State<Arc<AppState>>,
    Path(gateway_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let gateway = match auth::authenticate_gateway(&state, &gateway_id, &headers).await {
        Ok(gateway) => gateway,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };

    // The authenticated id travels out-of-band of the socket payloads;
    // the hub pins the hello against it.
    let hub = state.registry.hub_for(&gateway.id).await;
    ws.on_upgrade(move |socket| run_gateway_socket(socket, hub)).into_response()
}

/// Pump the socket: outbound channel → WS sink, WS stream → hub mailbox.
async fn run_gateway_socket(socket: WebSocket, hub: Hub) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let epoch = hub.attach_gateway(out_tx);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                match out {
                    Some(Outbound::Text(text)) => {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Binary(bytes)) => {
                        if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = ws_tx
                            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => hub.gateway_text(epoch, text.to_string()),
                    Some(Ok(Message::Binary(bytes))) => hub.gateway_binary(epoch, bytes),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // ping/pong
                }
            }
        }
    }

    hub.gateway_closed(epoch);
}
