// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway-id-keyed registry of running hub instances.
//!
//! The routing key is the gateway id itself, so a given gateway always
//! lands on the same instance, created lazily on first contact.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::config::HubConfig;
use crate::hub::Hub;
use crate::store::Store;

pub struct HubRegistry {
    hubs: RwLock<HashMap<String, Hub>>,
    config: HubConfig,
    store: Store,
}

impl HubRegistry {
    pub fn new(config: HubConfig, store: Store) -> Self {
        Self { hubs: RwLock::new(HashMap::new()), config, store }
    }

    /// Get the hub for a gateway id, spawning it on first use. A hub
    /// that was shut down is replaced by a fresh instance.
    pub async fn hub_for(&self, gateway_id: &str) -> Hub {
        {
            let hubs = self.hubs.read().await;
            if let Some(hub) = hubs.get(gateway_id) {
                if !hub.is_closed() {
                    return hub.clone();
                }
            }
        }

        let mut hubs = self.hubs.write().await;
        // Double-check after acquiring the write lock.
        if let Some(hub) = hubs.get(gateway_id) {
            if !hub.is_closed() {
                return hub.clone();
            }
        }
        let hub = Hub::spawn(gateway_id, self.config.clone(), self.store.clone());
        hubs.insert(gateway_id.to_owned(), hub.clone());
        hub
    }

    /// The running hub for a gateway id, if any.
    pub async fn get(&self, gateway_id: &str) -> Option<Hub> {
        let hubs = self.hubs.read().await;
        hubs.get(gateway_id).filter(|hub| !hub.is_closed()).cloned()
    }

    /// Shut down and forget the hub for a gateway id. No-op when absent.
    pub async fn shutdown_hub(&self, gateway_id: &str) {
        let hub = { self.hubs.write().await.remove(gateway_id) };
        if let Some(hub) = hub {
            hub.shutdown().await;
        }
    }

    /// Shut down every hub. Used on process exit.
    pub async fn shutdown_all(&self) {
        let hubs: Vec<Hub> = { self.hubs.write().await.drain().map(|(_, hub)| hub).collect() };
        for hub in hubs {
            hub.shutdown().await;
        }
    }
}
