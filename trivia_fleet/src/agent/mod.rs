//! Per-bot supervisors.
//!
//! An [`Agent`] drives one bot through a single playthrough end-to-end:
//! join sequence, phase-dispatch loop, two-tier retry/recovery, and
//! cleanup. Agents own their browser session exclusively and never share
//! it with siblings.

pub mod supervisor;

pub use supervisor::{Agent, AgentOptions};

use crate::behavior::ProfileId;
use crate::phase::GamePhase;
use thiserror::Error;

/// Terminal per-agent failures. One agent failing never aborts its
/// siblings or the pool.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{what} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        last: String,
    },

    #[error("recovery budget exhausted after {used} recoveries: {last}")]
    RecoveryBudgetExhausted { used: u32, last: String },

    #[error("{count} consecutive error screens")]
    ErrorScreens { count: u32 },

    #[error("timed out waiting for the game to start")]
    GameStartTimeout,

    #[error("agent stopped")]
    Stopped,
}

/// Raw outcome of one bot's run
#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    /// Questions this bot submitted an answer for
    pub questions_answered: u32,

    /// Answers confirmed or presumed correct
    pub correct_answers: u32,

    /// Final score read from the platform, if visible
    pub final_score: Option<i64>,

    /// Last parsed ranking position, if any
    pub final_rank: Option<u32>,

    /// Terminal error, if the run failed
    pub error: Option<String>,
}

/// One bot's run, owned by its agent and exposed read-only to the pool
#[derive(Debug, Clone)]
pub struct AgentRecord {
    /// Owning profile id
    pub profile_id: ProfileId,

    /// Most recently committed phase
    pub phase: GamePhase,

    /// Questions the detector has seen
    pub questions_seen: u32,

    /// Lifetime recoveries consumed; reset only on a confirmed
    /// successful join
    pub recoveries_used: u32,

    /// Whether the bot completed the join sequence
    pub joined: bool,

    /// Whether the behavior model decided this bot never shows up
    pub no_show: bool,

    /// Partial or final result
    pub result: AgentResult,
}

impl AgentRecord {
    pub fn new(profile_id: ProfileId) -> Self {
        Self {
            profile_id,
            phase: GamePhase::Unknown,
            questions_seen: 0,
            recoveries_used: 0,
            joined: false,
            no_show: false,
            result: AgentResult::default(),
        }
    }

    /// Whether this run counts as failed for pool aggregation
    pub fn is_failed(&self) -> bool {
        self.result.error.is_some()
    }
}
