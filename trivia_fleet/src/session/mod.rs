//! Session lifecycle coordination.
//!
//! A [`SessionCoordinator`] owns one worker pool for one playthrough and
//! walks the session record through
//! `Idle -> Initializing -> Running -> {Completed | Failed | Stopped}`.
//! Persistence and recap collaborators are optional; their failures are
//! logged and never affect session status.

use crate::agent::AgentOptions;
use crate::behavior::{BehaviorModel, BotProfile};
use crate::driver::DriverFactory;
use crate::persistence::{SessionSink, StatusFields};
use crate::pool::{PoolOptions, PoolResults, WorkerPool};
use crate::recap::RecapGenerator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Initializing,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl SessionStatus {
    /// Whether this status is terminal; a record never leaves a terminal
    /// status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{repr}")
    }
}

/// Aggregated outcome of one playthrough
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub agents_completed: usize,
    pub agents_failed: usize,
    pub questions_answered: u32,
    pub correct_answers: u32,
}

/// One playthrough: roster, lifecycle status, timestamps, outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub game_url: String,
    pub roster: Vec<String>,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub outcome: Option<SessionOutcome>,
}

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot initialize from status '{0}'")]
    NotIdle(SessionStatus),

    #[error("cannot start from status '{0}'")]
    NotInitialized(SessionStatus),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Top-level lifecycle wrapper owning one worker pool per playthrough
pub struct SessionCoordinator {
    record: Mutex<SessionRecord>,
    roster: Vec<BotProfile>,
    pool: WorkerPool,
    pool_options: PoolOptions,
    sink: Option<Arc<dyn SessionSink>>,
    recap: Option<Arc<dyn RecapGenerator>>,
}

impl SessionCoordinator {
    /// Build a coordinator for one playthrough. Collaborators are
    /// explicit instances, never ambient globals; the sink and recap
    /// generator may be absent.
    pub fn new(
        game_url: &str,
        roster: Vec<BotProfile>,
        behavior: Arc<BehaviorModel>,
        factory: Arc<dyn DriverFactory>,
        agent_options: AgentOptions,
        pool_options: PoolOptions,
        sink: Option<Arc<dyn SessionSink>>,
        recap: Option<Arc<dyn RecapGenerator>>,
    ) -> Self {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            game_url: game_url.to_string(),
            roster: roster.iter().map(|p| p.id.clone()).collect(),
            status: SessionStatus::Idle,
            started_at: None,
            ended_at: None,
            duration_secs: None,
            outcome: None,
        };

        Self {
            record: Mutex::new(record),
            roster,
            pool: WorkerPool::new(behavior, factory, agent_options),
            pool_options,
            sink,
            recap,
        }
    }

    /// Session id assigned at construction
    pub async fn session_id(&self) -> Uuid {
        self.record.lock().await.id
    }

    /// Read-only snapshot of the session record
    pub async fn record(&self) -> SessionRecord {
        self.record.lock().await.clone()
    }

    /// Register agents for the roster. Fails unless the session is idle.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        {
            let mut record = self.record.lock().await;
            if record.status != SessionStatus::Idle {
                return Err(SessionError::NotIdle(record.status));
            }
            record.status = SessionStatus::Initializing;
        }

        self.pool.add_agents(&self.roster).await;
        log::info!(
            "session {} initialized with {} profiles",
            self.session_id().await,
            self.roster.len()
        );
        Ok(())
    }

    /// Run the playthrough to completion.
    ///
    /// Validates the configuration before any transition, then delegates
    /// to the pool and aggregates on return. The coordinator reports
    /// success as long as the pool completes its admission loop; per-agent
    /// failures only show up in the aggregated counts.
    pub async fn start(&self) -> Result<SessionOutcome, SessionError> {
        let (session_id, url) = {
            let record = self.record.lock().await;
            if record.status != SessionStatus::Initializing {
                return Err(SessionError::NotInitialized(record.status));
            }
            if self.roster.is_empty() {
                return Err(SessionError::Configuration("empty roster".to_string()));
            }
            if record.game_url.trim().is_empty() {
                return Err(SessionError::Configuration("empty game URL".to_string()));
            }
            (record.id, record.game_url.clone())
        };

        let started_at = Utc::now();
        {
            let mut record = self.record.lock().await;
            record.status = SessionStatus::Running;
            record.started_at = Some(started_at);
        }
        self.notify_sink(session_id, SessionStatus::Running).await;
        log::info!("session {session_id} running against {url}");

        self.pool.start_all(&url, &self.pool_options).await;

        let results = self.pool.results().await;
        let outcome = aggregate(&results);
        let ended_at = Utc::now();

        let final_status = {
            let mut record = self.record.lock().await;
            // stop() may have already marked the session stopped.
            if !record.status.is_terminal() {
                record.status = SessionStatus::Completed;
            }
            record.ended_at = Some(ended_at);
            record.duration_secs = Some((ended_at - started_at).num_seconds());
            record.outcome = Some(outcome.clone());
            record.status
        };

        log::info!(
            "session {session_id} {final_status}: {} completed, {} failed, {}/{} correct",
            outcome.agents_completed,
            outcome.agents_failed,
            outcome.correct_answers,
            outcome.questions_answered
        );

        self.notify_sink(session_id, final_status).await;
        self.save_result().await;
        self.generate_recap().await;

        Ok(outcome)
    }

    /// Cooperatively stop all agents. Idempotent; may be called before
    /// `start` completes. Marks the session stopped only if it was
    /// running.
    pub async fn stop(&self) {
        {
            let mut record = self.record.lock().await;
            if record.status == SessionStatus::Running {
                record.status = SessionStatus::Stopped;
            }
        }
        self.pool.stop_all().await;
    }

    /// Release all pool resources. Safe to call multiple times.
    pub async fn cleanup(&self) {
        self.pool.cleanup().await;
    }

    /// Best-effort status notification; sink absence and sink failures
    /// never affect the session
    async fn notify_sink(&self, session_id: Uuid, status: SessionStatus) {
        let Some(sink) = &self.sink else {
            return;
        };
        let fields = {
            let record = self.record.lock().await;
            StatusFields {
                game_url: record.game_url.clone(),
                roster_size: record.roster.len(),
                started_at: record.started_at,
                ended_at: record.ended_at,
            }
        };
        if let Err(e) = sink.notify_status(session_id, status, &fields).await {
            log::warn!("status notification failed (ignored): {e}");
        }
    }

    async fn save_result(&self) {
        let Some(sink) = &self.sink else {
            return;
        };
        let record = self.record.lock().await.clone();
        if let Err(e) = sink.save_session_result(&record).await {
            log::warn!("session result save failed (ignored): {e}");
        }
    }

    async fn generate_recap(&self) {
        let Some(recap) = &self.recap else {
            return;
        };
        let record = self.record.lock().await.clone();
        match recap.generate(&record).await {
            Ok(text) => log::info!("session recap: {text}"),
            Err(e) => log::warn!("recap generation failed (ignored): {e}"),
        }
    }
}

fn aggregate(results: &PoolResults) -> SessionOutcome {
    let mut outcome = SessionOutcome {
        agents_completed: results.completed.len(),
        agents_failed: results.failed.len(),
        ..SessionOutcome::default()
    };
    for record in results.completed.iter().chain(results.failed.iter()) {
        outcome.questions_answered += record.result.questions_answered;
        outcome.correct_answers += record.result.correct_answers;
    }
    outcome
}
