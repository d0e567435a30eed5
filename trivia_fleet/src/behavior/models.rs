//! Bot profile and per-profile run state models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bot profile identifier
pub type ProfileId = String;

/// Streak magnitude at which a player is considered hot or cold
pub const STREAK_THRESHOLD: i32 = 3;

/// Fatigue added per answered question
pub const FATIGUE_PER_QUESTION: f32 = 0.02;

/// Reaction time envelope in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReactionTime {
    /// Fastest plausible answer time
    pub min_ms: u64,

    /// Slowest plausible answer time
    pub max_ms: u64,

    /// Typical answer time
    pub avg_ms: u64,
}

impl Default for ReactionTime {
    fn default() -> Self {
        Self {
            min_ms: 1_500,
            max_ms: 12_000,
            avg_ms: 4_500,
        }
    }
}

/// Personality presets affecting answer timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    /// Snap answers, 0.7x delay multiplier
    Fast,

    /// Deliberate, 1.3x delay multiplier
    Cautious,

    /// Unpredictable, 0.5x-1.5x delay multiplier
    Random,

    /// Baseline, 1.0x delay multiplier
    Steady,
}

impl Default for Personality {
    fn default() -> Self {
        Self::Steady
    }
}

/// Static identity and behavioral parameters for one bot.
///
/// Immutable once constructed. Created by the roster source and consumed
/// read-only by the behavior model and agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    /// Unique profile ID
    pub id: ProfileId,

    /// Display name shown to the game platform
    pub name: String,

    /// Baseline probability of answering correctly (0.0 to 1.0)
    pub accuracy: f32,

    /// Per-category accuracy overrides (category name -> accuracy)
    #[serde(default)]
    pub category_accuracy: HashMap<String, f32>,

    /// Reaction time envelope
    #[serde(default)]
    pub reaction_time: ReactionTime,

    /// Timing personality
    #[serde(default)]
    pub personality: Personality,

    /// Inverse of answer variance (0.0 to 1.0); higher = steadier
    pub consistency: f32,

    /// Probability the bot never shows up (0.0 to 1.0)
    #[serde(default)]
    pub no_show_chance: f32,

    /// Probability the bot joins late (0.0 to 1.0)
    #[serde(default)]
    pub late_join_chance: f32,

    /// Optional team affiliation
    #[serde(default)]
    pub team: Option<String>,
}

impl BotProfile {
    /// Accuracy for a category, falling back to the profile baseline
    pub fn accuracy_for(&self, category: Option<&str>) -> f32 {
        category
            .and_then(|c| self.category_accuracy.get(c).copied())
            .unwrap_or(self.accuracy)
    }
}

/// Mutable per-profile counters, owned by the behavior model and keyed
/// uniquely by profile id. Reset at the start of each session.
#[derive(Debug, Clone, Default)]
pub struct PlayerRunState {
    /// Questions answered so far this session
    pub questions_answered: u32,

    /// Correct answers so far this session
    pub correct_answers: u32,

    /// Signed streak: positive = consecutive correct, negative =
    /// consecutive incorrect
    pub streak: i32,

    /// Monotonically increasing fatigue, +0.02 per answered question
    pub fatigue: f32,
}

impl PlayerRunState {
    /// Whether the player is on a hot streak (3+ consecutive correct)
    pub fn is_hot(&self) -> bool {
        self.streak >= STREAK_THRESHOLD
    }

    /// Whether the player is on a cold streak (3+ consecutive incorrect)
    pub fn is_cold(&self) -> bool {
        self.streak <= -STREAK_THRESHOLD
    }

    /// Record one answer outcome: extend a same-sign run, or flip the
    /// sign and restart the magnitude on an opposite result.
    pub fn record(&mut self, was_correct: bool) {
        self.questions_answered += 1;
        if was_correct {
            self.correct_answers += 1;
            self.streak = if self.streak > 0 { self.streak + 1 } else { 1 };
        } else {
            self.streak = if self.streak < 0 { self.streak - 1 } else { -1 };
        }
        self.fatigue += FATIGUE_PER_QUESTION;
    }
}
