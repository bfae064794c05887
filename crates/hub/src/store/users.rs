// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Users and their email / OAuth-provider identities.

use serde::Serialize;

use super::{now_ts, Store};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthIdentity {
    pub provider: String,
    pub provider_user_id: String,
    pub user_id: String,
    pub verified: bool,
    pub last_login: i64,
}

/// Outcome of a sign-in identity resolution.
#[derive(Debug, Clone)]
pub enum IdentityOutcome {
    Resolved(User),
    /// Provider identity and email point at different users. No merge.
    Conflict,
}

/// Canonical email form used for every lookup and write.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Store {
    pub async fn create_user(&self) -> anyhow::Result<User> {
        let user = User { id: format!("usr-{}", uuid::Uuid::new_v4()), created_at: now_ts() };
        sqlx::query("INSERT INTO users (id, created_at) VALUES (?, ?)")
            .bind(&user.id)
            .bind(user.created_at)
            .execute(self.pool())
            .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    pub async fn upsert_email_identity(&self, email: &str, user_id: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO email_identities (email, user_id) VALUES (?, ?)
             ON CONFLICT(email) DO UPDATE SET user_id = excluded.user_id",
        )
        .bind(normalize_email(email))
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT u.id, u.created_at FROM users u
             JOIN email_identities e ON e.user_id = u.id
             WHERE e.email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    pub async fn upsert_auth_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
        user_id: &str,
        verified: bool,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO auth_identities (provider, provider_user_id, user_id, verified, last_login)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(provider, provider_user_id)
             DO UPDATE SET verified = excluded.verified, last_login = excluded.last_login",
        )
        .bind(provider)
        .bind(provider_user_id)
        .bind(user_id)
        .bind(verified)
        .bind(now_ts())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_auth_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> anyhow::Result<Option<AuthIdentity>> {
        let identity = sqlx::query_as::<_, AuthIdentity>(
            "SELECT provider, provider_user_id, user_id, verified, last_login
             FROM auth_identities WHERE provider = ? AND provider_user_id = ?",
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(identity)
    }

    /// Resolve a (provider, provider_user_id, email) sign-in to a user.
    ///
    /// Deterministic whatever the arrival order of equivalent pairs: an
    /// existing provider identity wins, then an existing email binding,
    /// then a fresh user is created with both bindings. If the provider
    /// identity and the email resolve to *different* users, nothing is
    /// written and [`IdentityOutcome::Conflict`] is returned.
    pub async fn resolve_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
        email: &str,
    ) -> anyhow::Result<IdentityOutcome> {
        let by_provider = self.get_auth_identity(provider, provider_user_id).await?;
        let by_email = self.get_user_by_email(email).await?;

        match (by_provider, by_email) {
            (Some(identity), Some(user)) if identity.user_id != user.id => {
                Ok(IdentityOutcome::Conflict)
            }
            (Some(identity), _) => {
                self.upsert_auth_identity(provider, provider_user_id, &identity.user_id, true)
                    .await?;
                self.upsert_email_identity(email, &identity.user_id).await?;
                let user = self
                    .get_user(&identity.user_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("identity references missing user"))?;
                Ok(IdentityOutcome::Resolved(user))
            }
            (None, Some(user)) => {
                self.upsert_auth_identity(provider, provider_user_id, &user.id, true).await?;
                Ok(IdentityOutcome::Resolved(user))
            }
            (None, None) => {
                let user = self.create_user().await?;
                self.upsert_email_identity(email, &user.id).await?;
                self.upsert_auth_identity(provider, provider_user_id, &user.id, true).await?;
                Ok(IdentityOutcome::Resolved(user))
            }
        }
    }
}
