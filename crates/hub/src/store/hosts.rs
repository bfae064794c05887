// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hosts and their status lifecycle.

use serde::{Deserialize, Serialize};

use super::{now_ts, Store};

/// Host status. `provisioning → active` happens only on the first valid
/// gateway hello; `deleting` precedes any destructive provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum HostStatus {
    Provisioning,
    Active,
    Off,
    Deleting,
    ProvisioningTimeout,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Host {
    pub id: String,
    pub user_id: String,
    /// Cloud provider resource id; 0 for manually attached hosts.
    pub droplet_id: i64,
    pub region: String,
    pub size: String,
    pub ipv4: Option<String>,
    pub status: HostStatus,
    pub provision_deadline: i64,
    pub created_at: i64,
}

impl Store {
    pub async fn create_host(
        &self,
        user_id: &str,
        region: &str,
        size: &str,
        provision_deadline: i64,
    ) -> anyhow::Result<Host> {
        let host = Host {
            id: format!("vps-{}", uuid::Uuid::new_v4()),
            user_id: user_id.to_owned(),
            droplet_id: 0,
            region: region.to_owned(),
            size: size.to_owned(),
            ipv4: None,
            status: HostStatus::Provisioning,
            provision_deadline,
            created_at: now_ts(),
        };
        sqlx::query(
            "INSERT INTO hosts (id, user_id, droplet_id, region, size, ipv4, status, provision_deadline, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&host.id)
        .bind(&host.user_id)
        .bind(host.droplet_id)
        .bind(&host.region)
        .bind(&host.size)
        .bind(&host.ipv4)
        .bind(host.status)
        .bind(host.provision_deadline)
        .bind(host.created_at)
        .execute(self.pool())
        .await?;
        Ok(host)
    }

    pub async fn get_host(&self, id: &str) -> anyhow::Result<Option<Host>> {
        let host = sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(host)
    }

    pub async fn list_hosts_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Host>> {
        let hosts = sqlx::query_as::<_, Host>(
            "SELECT * FROM hosts WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(hosts)
    }

    pub async fn update_host_status(&self, id: &str, status: HostStatus) -> anyhow::Result<()> {
        sqlx::query("UPDATE hosts SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_host_droplet(&self, id: &str, droplet_id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE hosts SET droplet_id = ? WHERE id = ?")
            .bind(droplet_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_host_ipv4(&self, id: &str, ipv4: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE hosts SET ipv4 = ? WHERE id = ?")
            .bind(ipv4)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Ordered cascade: authorized keys → sessions → gateways → host, in
    /// a single transaction. Callers run this only after the provider
    /// delete has succeeded (or for hosts with no provider resource).
    pub async fn delete_host_cascade(&self, id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM authorized_keys WHERE host_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE host_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM gateways WHERE host_id = ?").bind(id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM hosts WHERE id = ?").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Hosts still `provisioning` past their deadline whose gateway has
    /// not connected.
    pub async fn list_provisioning_timed_out(&self, now: i64) -> anyhow::Result<Vec<Host>> {
        let hosts = sqlx::query_as::<_, Host>(
            "SELECT h.* FROM hosts h
             LEFT JOIN gateways g ON g.host_id = h.id
             WHERE h.status = 'provisioning'
               AND h.provision_deadline < ?
               AND COALESCE(g.connected, 0) = 0",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(hosts)
    }

    pub async fn list_deleting(&self) -> anyhow::Result<Vec<Host>> {
        let hosts = sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE status = 'deleting'")
            .fetch_all(self.pool())
            .await?;
        Ok(hosts)
    }

    /// Hosts with a provider resource assigned but no observed address.
    pub async fn list_hosts_missing_ipv4(&self) -> anyhow::Result<Vec<Host>> {
        let hosts = sqlx::query_as::<_, Host>(
            "SELECT * FROM hosts WHERE droplet_id != 0 AND ipv4 IS NULL AND status != 'deleting'",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(hosts)
    }
}
