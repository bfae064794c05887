// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user cloud provider tokens, encrypted at rest.
//!
//! The store only ever sees sealed blobs; sealing and opening happen here
//! against the process KEK so no caller can accidentally persist a
//! plaintext token.

use super::{now_ts, Store};
use crate::auth::crypt::Kek;

/// Decrypted provider tokens for one user.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seal version the row was written with.
    pub version: i64,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    access_token: Vec<u8>,
    refresh_token: Option<Vec<u8>>,
    version: i64,
}

impl Store {
    pub async fn put_provider_tokens(
        &self,
        kek: &Kek,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<()> {
        let access = kek.seal(access_token.as_bytes())?;
        let refresh = match refresh_token {
            Some(token) => Some(kek.seal(token.as_bytes())?),
            None => None,
        };
        sqlx::query(
            "INSERT INTO host_credentials (user_id, access_token, refresh_token, version, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id)
             DO UPDATE SET access_token = excluded.access_token,
                           refresh_token = excluded.refresh_token,
                           version = excluded.version,
                           updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(access)
        .bind(refresh)
        .bind(i64::from(crate::auth::crypt::SEAL_VERSION))
        .bind(now_ts())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_provider_tokens(
        &self,
        kek: &Kek,
        user_id: &str,
    ) -> anyhow::Result<Option<ProviderTokens>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT access_token, refresh_token, version FROM host_credentials WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token = String::from_utf8(kek.open(&row.access_token)?)?;
        let refresh_token = match row.refresh_token {
            Some(sealed) => Some(String::from_utf8(kek.open(&sealed)?)?),
            None => None,
        };
        Ok(Some(ProviderTokens { access_token, refresh_token, version: row.version }))
    }
}
