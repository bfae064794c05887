// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal session rows.

use serde::{Deserialize, Serialize};

use super::{now_ts, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Ended,
    Error,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub host_id: String,
    pub user_id: String,
    pub title: String,
    pub workdir: String,
    pub agent: String,
    pub status: SessionStatus,
    pub last_activity: i64,
}

impl Store {
    pub async fn create_session(
        &self,
        host_id: &str,
        user_id: &str,
        title: &str,
        workdir: &str,
        agent: &str,
    ) -> anyhow::Result<Session> {
        let session = Session {
            id: format!("ses-{}", uuid::Uuid::new_v4()),
            host_id: host_id.to_owned(),
            user_id: user_id.to_owned(),
            title: title.to_owned(),
            workdir: workdir.to_owned(),
            agent: agent.to_owned(),
            status: SessionStatus::Starting,
            last_activity: now_ts(),
        };
        sqlx::query(
            "INSERT INTO sessions (id, host_id, user_id, title, workdir, agent, status, last_activity)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.host_id)
        .bind(&session.user_id)
        .bind(&session.title)
        .bind(&session.workdir)
        .bind(&session.agent)
        .bind(session.status)
        .bind(session.last_activity)
        .execute(self.pool())
        .await?;
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(session)
    }

    pub async fn list_sessions_for_host(&self, host_id: &str) -> anyhow::Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE host_id = ? ORDER BY last_activity DESC",
        )
        .bind(host_id)
        .fetch_all(self.pool())
        .await?;
        Ok(sessions)
    }

    pub async fn update_session_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE sessions SET status = ?, last_activity = ? WHERE id = ?")
            .bind(status)
            .bind(now_ts())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn touch_session(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE sessions SET last_activity = ? WHERE id = ?")
            .bind(now_ts())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
