// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Authentication mode for the browser-facing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AuthMode {
    /// Session cookies only.
    Prod,
    /// Additionally accept the `x-dev-user` header carrying a user id.
    Dev,
}

/// Configuration for the tether hub.
#[derive(Debug, Clone, clap::Args)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "TETHER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "TETHER_PORT")]
    pub port: u16,

    /// SQLite database URL for the metadata store.
    #[arg(long, default_value = "sqlite://tether.db?mode=rwc", env = "TETHER_DATABASE_URL")]
    pub database_url: String,

    /// MAC key for gateway bearer tokens.
    #[arg(long, env = "TETHER_GATEWAY_TOKEN_SALT")]
    pub gateway_token_salt: String,

    /// MAC key for browser session cookies.
    #[arg(long, env = "TETHER_SESSION_COOKIE_SECRET")]
    pub session_cookie_secret: String,

    /// 256-bit base64 key-encryption key for provider tokens at rest.
    #[arg(long, env = "TETHER_HOST_TOKEN_KEK")]
    pub host_token_kek: String,

    /// Authentication mode. Dev enables the `x-dev-user` header bypass.
    #[arg(long, value_enum, default_value = "prod", env = "TETHER_AUTH_MODE")]
    pub auth_mode: AuthMode,

    /// Cloud provider API base URL.
    #[arg(long, default_value = "https://api.digitalocean.com", env = "TETHER_PROVIDER_BASE_URL")]
    pub provider_base_url: String,

    /// Region for newly provisioned hosts.
    #[arg(long, default_value = "sfo3", env = "TETHER_PROVIDER_REGION")]
    pub provider_region: String,

    /// Size slug for newly provisioned hosts.
    #[arg(long, default_value = "s-2vcpu-4gb", env = "TETHER_PROVIDER_SIZE")]
    pub provider_size: String,

    /// Ack-tracked command timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "TETHER_COMMAND_TIMEOUT_MS")]
    pub command_timeout_ms: u64,

    /// Seconds of browser silence before idle eviction.
    #[arg(long, default_value_t = 600, env = "TETHER_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,

    /// Idle sweep period in seconds.
    #[arg(long, default_value_t = 60, env = "TETHER_IDLE_SWEEP_SECS")]
    pub idle_sweep_secs: u64,

    /// Grace period after a gateway link drops before the disconnect is
    /// re-asserted in the store.
    #[arg(long, default_value_t = 30, env = "TETHER_GRACE_SECS")]
    pub grace_secs: u64,

    /// Seconds a host may stay in `provisioning` before reconciliation
    /// marks it timed out.
    #[arg(long, default_value_t = 600, env = "TETHER_PROVISION_TIMEOUT_SECS")]
    pub provision_timeout_secs: u64,

    /// Reconciliation period in seconds.
    #[arg(long, default_value_t = 60, env = "TETHER_RECONCILE_SECS")]
    pub reconcile_secs: u64,

    /// Ceiling for inbound text frames in bytes.
    #[arg(long, default_value_t = 256 * 1024, env = "TETHER_MAX_TEXT_BYTES")]
    pub max_text_bytes: usize,

    /// Ceiling for inbound binary frames in bytes.
    #[arg(long, default_value_t = 64 * 1024, env = "TETHER_MAX_BINARY_BYTES")]
    pub max_binary_bytes: usize,
}

impl HubConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_secs)
    }
}
