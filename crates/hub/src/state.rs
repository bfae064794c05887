// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::crypt::Kek;
use crate::config::HubConfig;
use crate::hub::HubRegistry;
use crate::provider::ProviderApi;
use crate::store::Store;

/// Shared application state behind the router.
pub struct AppState {
    pub config: HubConfig,
    pub store: Store,
    pub registry: HubRegistry,
    pub kek: Kek,
    pub provider: Arc<dyn ProviderApi>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: HubConfig,
        store: Store,
        kek: Kek,
        provider: Arc<dyn ProviderApi>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = HubRegistry::new(config.clone(), store.clone());
        Self { config, store, registry, kek, provider, shutdown }
    }
}
