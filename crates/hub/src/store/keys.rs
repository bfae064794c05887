// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorized SSH keys, unique per (host, fingerprint).

use serde::{Deserialize, Serialize};

use super::{now_ts, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum KeyKind {
    User,
    Support,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthorizedKey {
    pub host_id: String,
    pub fingerprint: String,
    pub public_key: String,
    pub label: String,
    pub kind: KeyKind,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl Store {
    pub async fn upsert_key(
        &self,
        host_id: &str,
        fingerprint: &str,
        public_key: &str,
        label: &str,
        kind: KeyKind,
        expires_at: Option<i64>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO authorized_keys (host_id, fingerprint, public_key, label, kind, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(host_id, fingerprint)
             DO UPDATE SET public_key = excluded.public_key, label = excluded.label,
                           kind = excluded.kind, expires_at = excluded.expires_at",
        )
        .bind(host_id)
        .bind(fingerprint)
        .bind(public_key)
        .bind(label)
        .bind(kind)
        .bind(expires_at)
        .bind(now_ts())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete_key(&self, host_id: &str, fingerprint: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "DELETE FROM authorized_keys WHERE host_id = ? AND fingerprint = ?",
        )
        .bind(host_id)
        .bind(fingerprint)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_keys(&self, host_id: &str) -> anyhow::Result<Vec<AuthorizedKey>> {
        let keys = sqlx::query_as::<_, AuthorizedKey>(
            "SELECT * FROM authorized_keys WHERE host_id = ? ORDER BY created_at",
        )
        .bind(host_id)
        .fetch_all(self.pool())
        .await?;
        Ok(keys)
    }
}
