// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-side WebSocket upgrade and socket pump.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::HubError;
use crate::hub::{Hub, Outbound, SubscriberId};
use crate::state::AppState;
use crate::transport::auth;

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    pub session_id: String,
}

/// `GET /hosts/{host_id}/terminal?session_id=…` — browser attach to one
/// terminal session. Requires a valid session cookie and ownership of
/// both the host and the session.
pub async fn terminal_connect(
    State(state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
    Query(query): Query<TerminalQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = match auth::authenticate_user(&state, &headers) {
        Ok(user_id) => user_id,
        Err(code) => return code.to_http_response("unauthorized").into_response(),
    };

    let lookup = async {
        let host = state
            .store
            .get_host(&host_id)
            .await
            .map_err(|_| HubError::Internal)?
            .filter(|host| host.user_id == user_id)
            .ok_or(HubError::NotFound)?;
        let session = state
            .store
            .get_session(&query.session_id)
            .await
            .map_err(|_| HubError::Internal)?
            .filter(|s| s.host_id == host.id && s.user_id == user_id)
            .ok_or(HubError::NotFound)?;
        let gateway = state
            .store
            .get_gateway_by_host(&host.id)
            .await
            .map_err(|_| HubError::Internal)?
            .ok_or(HubError::NotFound)?;
        Ok::<_, HubError>((session, gateway))
    };

    let (session, gateway) = match lookup.await {
        Ok(found) => found,
        Err(code) => return code.to_http_response("not found").into_response(),
    };

    let hub = state.registry.hub_for(&gateway.id).await;
    let session_id = session.id;
    ws.on_upgrade(move |socket| run_browser_socket(socket, hub, session_id, user_id))
        .into_response()
}

/// Pump one browser socket against its hub subscription.
async fn run_browser_socket(socket: WebSocket, hub: Hub, session_id: String, user_id: String) {
    let (tx, mut rx) = mpsc::channel(Hub::subscriber_buffer());
    let id: SubscriberId = hub.attach_browser(&session_id, &user_id, tx);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            out = rx.recv() => {
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
                    Some(Ok(Message::Text(text))) => hub.browser_text(id, text.to_string()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // binary from browsers is ignored
                }
            }
        }
    }

    hub.browser_closed(id);
}
