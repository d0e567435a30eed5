//! Game phase detection.
//!
//! The third-party platform imposes no persistent transition table, so
//! every classification independently re-derives a phase from the current
//! page signals. A fixed precedence order resolves ambiguity when several
//! signals apply at once; that order is the behavioral contract and the
//! heuristics behind it are isolated here so they can be swapped or
//! fuzzed without touching agent logic.

pub mod detector;

pub use detector::{PhaseDetector, PhaseError, PhasePoller, classify, start_polling};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The classified externally observed stage of the trivia game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    /// Registration form or returning-player screen
    Registration,
    /// Waiting room before the game starts
    Waiting,
    /// Pre-question countdown
    Countdown,
    /// A question is live and accepting answers
    Question,
    /// The correct answer is being revealed
    AnswerReveal,
    /// Standings are on screen
    Ranking,
    /// Idle gap between questions
    BetweenQuestions,
    /// The game is over
    GameEnded,
    /// The platform is showing an error screen
    Error,
    /// No signal matched and nothing has been committed yet
    Unknown,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Registration => "registration",
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Question => "question",
            Self::AnswerReveal => "answer-reveal",
            Self::Ranking => "ranking",
            Self::BetweenQuestions => "between-questions",
            Self::GameEnded => "game-ended",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{repr}")
    }
}
