// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the reconciliation passes, driven one round at
//! a time against the fake provider.

mod common;

use std::sync::atomic::Ordering;

use common::{test_state, FRESH_ACCESS_TOKEN};
use tether_hub::config::AuthMode;
use tether_hub::reconcile;
use tether_hub::store::hosts::HostStatus;
use tether_hub::store::now_ts;

#[tokio::test]
async fn overdue_provisioning_hosts_time_out() -> anyhow::Result<()> {
    let (state, _) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;

    let overdue = state.store.create_host(&user.id, "sfo3", "s", now_ts() - 10).await?;
    state.store.create_gateway(&overdue.id, "h1").await?;
    // Manual hosts (droplet 0) are treated identically.
    let manual_overdue = state.store.create_host(&user.id, "sfo3", "s", now_ts() - 10).await?;
    state.store.create_gateway(&manual_overdue.id, "h2").await?;
    let fresh = state.store.create_host(&user.id, "sfo3", "s", now_ts() + 600).await?;
    state.store.create_gateway(&fresh.id, "h3").await?;

    reconcile::run_passes(&state).await;

    for id in [&overdue.id, &manual_overdue.id] {
        let host = state.store.get_host(id).await?.expect("host");
        assert_eq!(host.status, HostStatus::ProvisioningTimeout);
    }
    let host = state.store.get_host(&fresh.id).await?.expect("host");
    assert_eq!(host.status, HostStatus::Provisioning);
    Ok(())
}

#[tokio::test]
async fn connected_gateway_blocks_provision_timeout() -> anyhow::Result<()> {
    let (state, _) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;
    let host = state.store.create_host(&user.id, "sfo3", "s", now_ts() - 10).await?;
    let gateway = state.store.create_gateway(&host.id, "h1").await?;
    state.store.gateway_hello(&gateway.id, "0.4.2").await?;
    state.store.update_host_status(&host.id, HostStatus::Provisioning).await?;

    reconcile::run_passes(&state).await;

    let host = state.store.get_host(&host.id).await?.expect("host");
    assert_eq!(host.status, HostStatus::Provisioning);
    Ok(())
}

#[tokio::test]
async fn deleting_host_retries_until_provider_succeeds() -> anyhow::Result<()> {
    let (state, provider) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;
    state.store.put_provider_tokens(&state.kek, &user.id, "do-access", None).await?;

    let host = state.store.create_host(&user.id, "sfo3", "s", now_ts() + 600).await?;
    state.store.create_gateway(&host.id, "h1").await?;
    state.store.update_host_droplet(&host.id, 4242).await?;
    state.store.update_host_status(&host.id, HostStatus::Deleting).await?;

    // First round: provider down, rows retained.
    provider.fail_delete.store(true, Ordering::Relaxed);
    reconcile::run_passes(&state).await;
    let row = state.store.get_host(&host.id).await?.expect("host");
    assert_eq!(row.status, HostStatus::Deleting);
    assert!(provider.deleted_ids().is_empty());

    // Next round: provider recovered, cloud delete then cascade.
    provider.fail_delete.store(false, Ordering::Relaxed);
    reconcile::run_passes(&state).await;
    assert_eq!(provider.deleted_ids(), vec![4242]);
    assert!(state.store.get_host(&host.id).await?.is_none());
    assert!(state.store.get_gateway_by_host(&host.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn expired_access_token_is_refreshed_once_and_persisted() -> anyhow::Result<()> {
    let (state, provider) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;
    state.store.put_provider_tokens(&state.kek, &user.id, "stale-access", Some("do-refresh")).await?;

    let host = state.store.create_host(&user.id, "sfo3", "s", now_ts() + 600).await?;
    state.store.update_host_status(&host.id, HostStatus::Deleting).await?;
    state.store.update_host_droplet(&host.id, 7).await?;

    provider.expire_access.store(true, Ordering::Relaxed);
    reconcile::run_passes(&state).await;

    assert_eq!(provider.refreshes.load(Ordering::Relaxed), 1);
    assert_eq!(provider.deleted_ids(), vec![7]);
    assert!(state.store.get_host(&host.id).await?.is_none());

    // The refreshed tokens replaced the stale ones.
    let tokens =
        state.store.get_provider_tokens(&state.kek, &user.id).await?.expect("tokens");
    assert_eq!(tokens.access_token, FRESH_ACCESS_TOKEN);
    assert_eq!(tokens.refresh_token.as_deref(), Some("fresh-refresh-token"));
    Ok(())
}

#[tokio::test]
async fn manual_deleting_host_skips_the_provider() -> anyhow::Result<()> {
    let (state, provider) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;
    let host = state.store.create_host(&user.id, "sfo3", "s", now_ts() + 600).await?;
    state.store.update_host_status(&host.id, HostStatus::Deleting).await?;

    reconcile::run_passes(&state).await;

    assert!(provider.deleted_ids().is_empty());
    assert!(state.store.get_host(&host.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_ipv4_is_backfilled_from_provider() -> anyhow::Result<()> {
    let (state, _provider) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;
    state.store.put_provider_tokens(&state.kek, &user.id, "do-access", None).await?;

    let host = state.store.create_host(&user.id, "sfo3", "s", now_ts() + 600).await?;
    state.store.update_host_droplet(&host.id, 55).await?;

    reconcile::run_passes(&state).await;

    let host = state.store.get_host(&host.id).await?.expect("host");
    assert_eq!(host.ipv4.as_deref(), Some("198.51.100.7"));
    Ok(())
}

#[tokio::test]
async fn ipv4_backfill_waits_for_provider_address() -> anyhow::Result<()> {
    let (state, provider) = test_state(AuthMode::Prod).await;
    let user = state.store.create_user().await?;
    state.store.put_provider_tokens(&state.kek, &user.id, "do-access", None).await?;

    let host = state.store.create_host(&user.id, "sfo3", "s", now_ts() + 600).await?;
    state.store.update_host_droplet(&host.id, 55).await?;

    // Provider has not assigned an address yet.
    *provider.droplet_ip.lock().expect("lock") = None;
    reconcile::run_passes(&state).await;
    assert!(state.store.get_host(&host.id).await?.expect("host").ipv4.is_none());

    *provider.droplet_ip.lock().expect("lock") = Some("203.0.113.9".to_owned());
    reconcile::run_passes(&state).await;
    assert_eq!(
        state.store.get_host(&host.id).await?.expect("host").ipv4.as_deref(),
        Some("203.0.113.9")
    );
    Ok(())
}
