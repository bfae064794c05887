// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for hub integration tests: in-memory state and a
//! scriptable fake provider.

// Each test binary uses a different slice of this harness.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use tether_hub::auth::crypt::Kek;
use tether_hub::config::{AuthMode, HubConfig};
use tether_hub::provider::{
    CreateDroplet, Droplet, ProviderApi, ProviderError, RefreshedTokens,
};
use tether_hub::state::AppState;
use tether_hub::store::Store;

pub const FRESH_ACCESS_TOKEN: &str = "fresh-access-token";

/// Scriptable in-memory provider.
#[derive(Default)]
pub struct FakeProvider {
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Reject deletes with 401 unless presented the refreshed token.
    pub expire_access: AtomicBool,
    pub next_id: AtomicI64,
    pub created: Mutex<Vec<CreateDroplet>>,
    pub deleted: Mutex<Vec<i64>>,
    pub refreshes: AtomicI64,
    pub droplet_ip: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        let provider = Self::default();
        provider.next_id.store(1000, Ordering::Relaxed);
        *provider.droplet_ip.lock().unwrap() = Some("198.51.100.7".to_owned());
        Arc::new(provider)
    }

    pub fn deleted_ids(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }
}

impl ProviderApi for FakeProvider {
    fn create_droplet<'a>(
        &'a self,
        _token: &'a str,
        req: &'a CreateDroplet,
    ) -> BoxFuture<'a, Result<Droplet, ProviderError>> {
        Box::pin(async move {
            if self.fail_create.load(Ordering::Relaxed) {
                return Err(ProviderError::with_status(500, "create refused"));
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            self.created.lock().unwrap().push(req.clone());
            Ok(Droplet { id, ipv4: self.droplet_ip.lock().unwrap().clone() })
        })
    }

    fn delete_droplet<'a>(
        &'a self,
        token: &'a str,
        droplet_id: i64,
    ) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            if self.expire_access.load(Ordering::Relaxed) && token != FRESH_ACCESS_TOKEN {
                return Err(ProviderError::with_status(401, "token expired"));
            }
            if self.fail_delete.load(Ordering::Relaxed) {
                return Err(ProviderError::with_status(500, "delete refused"));
            }
            self.deleted.lock().unwrap().push(droplet_id);
            Ok(())
        })
    }

    fn get_droplet<'a>(
        &'a self,
        _token: &'a str,
        droplet_id: i64,
    ) -> BoxFuture<'a, Result<Droplet, ProviderError>> {
        Box::pin(async move {
            Ok(Droplet { id: droplet_id, ipv4: self.droplet_ip.lock().unwrap().clone() })
        })
    }

    fn refresh_token<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<RefreshedTokens, ProviderError>> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
            Ok(RefreshedTokens {
                access_token: FRESH_ACCESS_TOKEN.to_owned(),
                refresh_token: Some("fresh-refresh-token".to_owned()),
            })
        })
    }
}

pub fn test_kek() -> Kek {
    Kek::from_base64(&STANDARD.encode([9u8; 32])).expect("test kek")
}

pub fn test_config(auth_mode: AuthMode) -> HubConfig {
    HubConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        database_url: "sqlite::memory:".to_owned(),
        gateway_token_salt: "test-salt".to_owned(),
        session_cookie_secret: "test-cookie-secret".to_owned(),
        host_token_kek: STANDARD.encode([9u8; 32]),
        auth_mode,
        provider_base_url: "http://provider.invalid".to_owned(),
        provider_region: "sfo3".to_owned(),
        provider_size: "s-2vcpu-4gb".to_owned(),
        command_timeout_ms: 2_000,
        idle_timeout_secs: 600,
        idle_sweep_secs: 60,
        grace_secs: 30,
        provision_timeout_secs: 600,
        reconcile_secs: 60,
        max_text_bytes: 256 * 1024,
        max_binary_bytes: 64 * 1024,
    }
}

pub async fn test_state(auth_mode: AuthMode) -> (Arc<AppState>, Arc<FakeProvider>) {
    let store = Store::memory().await.expect("in-memory store");
    let provider = FakeProvider::new();
    let state = Arc::new(AppState::new(
        test_config(auth_mode),
        store,
        test_kek(),
        Arc::clone(&provider) as Arc<dyn ProviderApi>,
        CancellationToken::new(),
    ));
    (state, provider)
}
