// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway rows: token hashes, liveness, versions.

use serde::Serialize;

use super::{now_ts, Store};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Gateway {
    pub id: String,
    pub host_id: String,
    /// Keyed MAC of the bearer token; plaintext is never stored.
    #[serde(skip_serializing)]
    pub auth_token_hash: String,
    pub version: Option<String>,
    pub last_seen: i64,
    pub connected: bool,
}

impl Store {
    pub async fn create_gateway(
        &self,
        host_id: &str,
        auth_token_hash: &str,
    ) -> anyhow::Result<Gateway> {
        let gateway = Gateway {
            id: format!("gw-{}", uuid::Uuid::new_v4()),
            host_id: host_id.to_owned(),
            auth_token_hash: auth_token_hash.to_owned(),
            version: None,
            last_seen: 0,
            connected: false,
        };
        sqlx::query(
            "INSERT INTO gateways (id, host_id, auth_token_hash, version, last_seen, connected)
             VALUES (?, ?, ?, NULL, 0, 0)",
        )
        .bind(&gateway.id)
        .bind(&gateway.host_id)
        .bind(&gateway.auth_token_hash)
        .execute(self.pool())
        .await?;
        Ok(gateway)
    }

    pub async fn get_gateway(&self, id: &str) -> anyhow::Result<Option<Gateway>> {
        let gateway = sqlx::query_as::<_, Gateway>("SELECT * FROM gateways WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(gateway)
    }

    pub async fn get_gateway_by_host(&self, host_id: &str) -> anyhow::Result<Option<Gateway>> {
        let gateway = sqlx::query_as::<_, Gateway>("SELECT * FROM gateways WHERE host_id = ?")
            .bind(host_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(gateway)
    }

    pub async fn update_gateway_connected(&self, id: &str, connected: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE gateways SET connected = ?, last_seen = ? WHERE id = ?")
            .bind(connected)
            .bind(now_ts())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_gateway_version(&self, id: &str, version: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE gateways SET version = ? WHERE id = ?")
            .bind(version)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_gateway_last_seen(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE gateways SET last_seen = ? WHERE id = ?")
            .bind(now_ts())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// The idempotent hello compound: record the reported version, mark
    /// connected (refreshing last-seen), and activate the owning host if
    /// (and only if) it is still `provisioning`. Every step replays
    /// safely, so a crash between them is harmless.
    pub async fn gateway_hello(&self, id: &str, version: &str) -> anyhow::Result<()> {
        self.update_gateway_version(id, version).await?;
        self.update_gateway_connected(id, true).await?;
        sqlx::query(
            "UPDATE hosts SET status = 'active'
             WHERE id = (SELECT host_id FROM gateways WHERE id = ?)
               AND status = 'provisioning'",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
