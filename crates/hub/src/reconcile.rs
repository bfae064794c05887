// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled reconciliation of host state.
//!
//! Runs every minute. Three passes: expire stuck provisioning, retry
//! cloud-first deletes, and backfill missing public addresses. Every
//! transition here is an idempotent replay of something the request path
//! may have already attempted, so racing with live traffic is safe.

use std::sync::Arc;

use crate::state::AppState;
use crate::store::hosts::{Host, HostStatus};
use crate::store::now_ts;

/// Spawn the background reconciler loop.
pub fn spawn_reconciler(state: Arc<AppState>) {
    let interval = state.config.reconcile_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            run_passes(&state).await;
        }
    });
}

/// One full reconciliation round.
pub async fn run_passes(state: &AppState) {
    if let Err(e) = pass_provision_timeouts(state).await {
        tracing::warn!(err = %e, "provision timeout pass failed");
    }
    if let Err(e) = pass_deleting(state).await {
        tracing::warn!(err = %e, "deleting pass failed");
    }
    if let Err(e) = pass_missing_ipv4(state).await {
        tracing::warn!(err = %e, "ipv4 backfill pass failed");
    }
}

/// Hosts stuck in `provisioning` past their deadline with no connected
/// gateway move to `provisioning_timeout`.
async fn pass_provision_timeouts(state: &AppState) -> anyhow::Result<()> {
    for host in state.store.list_provisioning_timed_out(now_ts()).await? {
        tracing::warn!(host_id = %host.id, "host provisioning timed out");
        state.store.update_host_status(&host.id, HostStatus::ProvisioningTimeout).await?;
    }
    Ok(())
}

/// Retry cloud-first deletes for hosts in `deleting`. Rows survive a
/// failed provider call and are retried next round.
async fn pass_deleting(state: &AppState) -> anyhow::Result<()> {
    for host in state.store.list_deleting().await? {
        if let Ok(Some(gateway)) = state.store.get_gateway_by_host(&host.id).await {
            state.registry.shutdown_hub(&gateway.id).await;
        }
        match destroy_host(state, &host).await {
            Ok(()) => tracing::info!(host_id = %host.id, "host deleted"),
            Err(e) => tracing::warn!(host_id = %host.id, err = %e, "delete failed, will retry"),
        }
    }
    Ok(())
}

/// Fetch and persist the public address for hosts that have a provider
/// resource but no observed IPv4 yet.
async fn pass_missing_ipv4(state: &AppState) -> anyhow::Result<()> {
    for host in state.store.list_hosts_missing_ipv4().await? {
        let Some(tokens) = state.store.get_provider_tokens(&state.kek, &host.user_id).await?
        else {
            continue;
        };
        match state.provider.get_droplet(&tokens.access_token, host.droplet_id).await {
            Ok(droplet) => {
                if let Some(ip) = droplet.ipv4 {
                    state.store.update_host_ipv4(&host.id, &ip).await?;
                    tracing::info!(host_id = %host.id, ip = %ip, "recorded host address");
                }
            }
            Err(e) => tracing::warn!(host_id = %host.id, err = %e, "address lookup failed"),
        }
    }
    Ok(())
}

/// Delete the provider resource (refreshing the token once on a 401),
/// then run the ordered cascade. Hosts with no provider resource
/// (`droplet_id = 0`, the manual-attach path) skip straight to the
/// cascade.
pub(crate) async fn destroy_host(state: &AppState, host: &Host) -> anyhow::Result<()> {
    if host.droplet_id != 0 {
        let tokens = state
            .store
            .get_provider_tokens(&state.kek, &host.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no provider credentials for {}", host.user_id))?;

        match state.provider.delete_droplet(&tokens.access_token, host.droplet_id).await {
            Ok(()) => {}
            Err(err) if err.is_unauthorized() => {
                let refresh = tokens
                    .refresh_token
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("access token rejected, no refresh token"))?;
                let fresh = state.provider.refresh_token(refresh).await?;
                state
                    .store
                    .put_provider_tokens(
                        &state.kek,
                        &host.user_id,
                        &fresh.access_token,
                        fresh.refresh_token.as_deref().or(Some(refresh)),
                    )
                    .await?;
                state.provider.delete_droplet(&fresh.access_token, host.droplet_id).await?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    state.store.delete_host_cascade(&host.id).await?;
    Ok(())
}
