//! Optional persistence sink.
//!
//! The core never persists anything itself; a [`SessionSink`] is resolved
//! once at coordinator construction and may be absent. Every call site
//! tolerates absence, and failures are logged and swallowed, never
//! propagated into session status.

use crate::session::{SessionRecord, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Sink failures; always best-effort from the caller's point of view
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Context fields attached to a status notification
#[derive(Debug, Clone)]
pub struct StatusFields {
    pub game_url: String,
    pub roster_size: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// External persistence collaborator
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Record a session status transition
    async fn notify_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        fields: &StatusFields,
    ) -> Result<(), SinkError>;

    /// Store a finished session record
    async fn save_session_result(&self, record: &SessionRecord) -> Result<(), SinkError>;
}

/// Postgres-backed sink
pub struct PgSessionSink {
    pool: Arc<PgPool>,
}

impl PgSessionSink {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a sink
    pub async fn connect(database_url: &str) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }
}

#[async_trait]
impl SessionSink for PgSessionSink {
    async fn notify_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        fields: &StatusFields,
    ) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            INSERT INTO session_status (session_id, status, game_url, roster_size, started_at, ended_at, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (session_id) DO UPDATE
            SET status = EXCLUDED.status,
                ended_at = EXCLUDED.ended_at,
                recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(session_id)
        .bind(status.to_string())
        .bind(&fields.game_url)
        .bind(fields.roster_size as i32)
        .bind(fields.started_at)
        .bind(fields.ended_at)
        .bind(Utc::now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn save_session_result(&self, record: &SessionRecord) -> Result<(), SinkError> {
        let outcome_json = serde_json::to_value(&record.outcome)?;

        sqlx::query(
            r#"
            INSERT INTO session_results (session_id, game_url, status, started_at, ended_at, duration_secs, roster_size, outcome)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(&record.game_url)
        .bind(record.status.to_string())
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.duration_secs)
        .bind(record.roster.len() as i32)
        .bind(outcome_json)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}
