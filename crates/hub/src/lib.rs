// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tether hub: the control plane that brokers browser terminals to
//! per-user VPS gateways.
//!
//! One WebSocket duplex per gateway, many per-session browser duplexes,
//! a shared metadata store, and a minute-cadence reconciler for host
//! state. See [`hub`] for the relay core.

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod provider;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::crypt::Kek;
use crate::config::HubConfig;
use crate::provider::HttpProvider;
use crate::state::AppState;
use crate::store::Store;
use crate::transport::build_router;

/// Run the hub server until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store = Store::connect(&config.database_url).await?;
    let kek = Kek::from_base64(&config.host_token_kek)?;
    let provider = Arc::new(HttpProvider::new(config.provider_base_url.clone()));

    let state = Arc::new(AppState::new(config, store, kek, provider, shutdown.clone()));
    reconcile::spawn_reconciler(Arc::clone(&state));

    tracing::info!("tether-hub listening on {addr}");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.registry.shutdown_all().await;
    Ok(())
}
