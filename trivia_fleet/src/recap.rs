//! Post-game narrative generation boundary.
//!
//! A recap generator consumes a completed session record and produces
//! narrative text (the surrounding system backs this with a language
//! model). Entirely out of the orchestration core: absence and failure
//! are both tolerated.

use crate::session::SessionRecord;
use async_trait::async_trait;

/// Optional content-generation collaborator
#[async_trait]
pub trait RecapGenerator: Send + Sync {
    /// Produce narrative text for a completed session
    async fn generate(&self, record: &SessionRecord) -> anyhow::Result<String>;
}

/// Deterministic recap built from the aggregated outcome alone; the
/// default when no language-model collaborator is wired in.
pub struct SummaryRecap;

#[async_trait]
impl RecapGenerator for SummaryRecap {
    async fn generate(&self, record: &SessionRecord) -> anyhow::Result<String> {
        let outcome = record.outcome.clone().unwrap_or_default();
        Ok(format!(
            "{} of {} players finished the game, answering {} questions ({} correct).",
            outcome.agents_completed,
            record.roster.len(),
            outcome.questions_answered,
            outcome.correct_answers
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionOutcome, SessionStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_summary_recap() {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            game_url: "https://game.test/x".to_string(),
            roster: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            status: SessionStatus::Completed,
            started_at: None,
            ended_at: None,
            duration_secs: Some(600),
            outcome: Some(SessionOutcome {
                agents_completed: 2,
                agents_failed: 1,
                questions_answered: 20,
                correct_answers: 13,
            }),
        };

        let text = SummaryRecap.generate(&record).await.unwrap();
        assert!(text.contains("2 of 3"));
        assert!(text.contains("13 correct"));
    }
}
