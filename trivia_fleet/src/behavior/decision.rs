//! Behavior model: statistical decision-making for answer correctness,
//! answer selection, timing, and join behavior.

use super::models::{BotProfile, PlayerRunState, Personality, ProfileId};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

// === Probability bounds ===

/// Floor for the correctness probability; even the worst player gets
/// lucky sometimes (10%)
const MIN_CORRECT_PROBABILITY: f32 = 0.10;

/// Ceiling for the correctness probability; even the best player slips
/// sometimes (95%)
const MAX_CORRECT_PROBABILITY: f32 = 0.95;

/// Configuration for behavior model modifiers and timing ranges.
///
/// All probability modifiers operate on the correctness probability in
/// range [0.0, 1.0] before the final clamp to [0.10, 0.95].
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    /// Bonus to correctness probability while on a hot streak.
    ///
    /// **Range**: 0.05-0.15 (typical: 0.10)
    /// **Effect**: 3+ consecutive correct answers add 10% confidence
    pub hot_streak_bonus: f32,

    /// Penalty to correctness probability while on a cold streak.
    ///
    /// **Range**: 0.05-0.15 (typical: 0.10)
    /// **Effect**: 3+ consecutive misses subtract 10% confidence
    pub cold_streak_penalty: f32,

    /// Multiplier applied to accumulated fatigue before subtracting it.
    ///
    /// **Range**: 0.3-0.8 (typical: 0.5)
    /// **Effect**: after 10 questions (fatigue 0.2) probability drops 10%
    pub fatigue_weight: f32,

    /// Multiplier applied to question difficulty before subtracting it.
    ///
    /// **Range**: 0.1-0.4 (typical: 0.2)
    /// **Effect**: a max-difficulty question drops probability by 20%
    pub difficulty_weight: f32,

    /// Scale of the consistency-driven jitter band.
    ///
    /// **Range**: 0.1-0.3 (typical: 0.2)
    /// **Effect**: a fully inconsistent player (consistency 0) jitters
    /// within +/-10%
    pub jitter_scale: f32,

    /// Difficulty-proportional increment to the answer delay, in ms.
    ///
    /// **Range**: 1000-5000 (typical: 2000)
    /// **Effect**: hard questions take up to 2 s longer to answer
    pub difficulty_delay_ms: u64,

    /// On-time join delay range in ms (inclusive of min, exclusive of max).
    pub on_time_join_ms: (u64, u64),

    /// Late join delay range in ms.
    pub late_join_ms: (u64, u64),
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            hot_streak_bonus: 0.10,
            cold_streak_penalty: 0.10,
            fatigue_weight: 0.5,
            difficulty_weight: 0.2,
            jitter_scale: 0.2,
            difficulty_delay_ms: 2_000,
            on_time_join_ms: (1_000, 10_000),
            late_join_ms: (30_000, 120_000),
        }
    }
}

/// Context for a single answer decision
#[derive(Debug, Clone, Default)]
pub struct AnswerContext {
    /// Question category, if the platform exposes one
    pub category: Option<String>,

    /// Question difficulty (0.0 to 1.0)
    pub difficulty: f32,
}

/// Why an answer index was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerReason {
    /// Correct index was known and the draw said "correct"
    Known,

    /// Correct index was known but the draw said "incorrect"
    DeliberateMiss,

    /// Correct index unknown; weighted guess favoring earlier options
    WeightedGuess,

    /// Correct index unknown; uniform random guess
    RandomGuess,
}

/// A chosen answer with its pre-submission delay
#[derive(Debug, Clone)]
pub struct AnswerChoice {
    /// Index into the option list
    pub index: usize,

    /// Delay to wait before submitting
    pub delay: Duration,

    /// Whether the model expects this answer to be correct. Used as a
    /// fallback streak signal when the platform result is indeterminate.
    pub expected_correct: bool,

    /// Why this index was chosen
    pub reason: AnswerReason,
}

/// Join timing decision for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// The bot never shows up; a modeled outcome, not an error
    NoShow,

    /// The bot joins late, after the given delay
    Late(Duration),

    /// The bot joins on time, after the given delay
    OnTime(Duration),
}

/// Statistical behavior model owning all per-profile run state.
///
/// One instance is shared by every agent in a pool. The run-state map is
/// keyed by profile id and each key is only ever touched by the one agent
/// that owns that profile, so there is no cross-agent contention.
pub struct BehaviorModel {
    config: BehaviorConfig,
    states: RwLock<HashMap<ProfileId, PlayerRunState>>,
}

impl BehaviorModel {
    /// Create a model with default tuning
    pub fn new() -> Self {
        Self::with_config(BehaviorConfig::default())
    }

    /// Create a model with custom tuning
    pub fn with_config(config: BehaviorConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Reset the run state for a profile to zero. Called once at the
    /// start of each session; state never carries across sessions.
    pub async fn reset_run_state(&self, profile_id: &str) {
        let mut states = self.states.write().await;
        states.insert(profile_id.to_string(), PlayerRunState::default());
    }

    /// Snapshot of a profile's current run state
    pub async fn run_state(&self, profile_id: &str) -> PlayerRunState {
        let states = self.states.read().await;
        states.get(profile_id).cloned().unwrap_or_default()
    }

    /// Compute the clamped correctness probability for one question.
    ///
    /// probability = accuracy (with category override)
    ///             + streak modifier (+hot bonus / -cold penalty)
    ///             - fatigue * fatigue_weight
    ///             - difficulty * difficulty_weight
    ///             + uniform jitter in +/-((1 - consistency) * jitter_scale) / 2
    /// clamped to [0.10, 0.95].
    pub fn correctness_probability(
        &self,
        profile: &BotProfile,
        state: &PlayerRunState,
        ctx: &AnswerContext,
    ) -> f32 {
        let mut p = profile.accuracy_for(ctx.category.as_deref());

        if state.is_hot() {
            p += self.config.hot_streak_bonus;
        } else if state.is_cold() {
            p -= self.config.cold_streak_penalty;
        }

        p -= state.fatigue * self.config.fatigue_weight;
        p -= ctx.difficulty * self.config.difficulty_weight;

        let jitter_band = (1.0 - profile.consistency.clamp(0.0, 1.0)) * self.config.jitter_scale;
        if jitter_band > 0.0 {
            let mut rng = rand::rng();
            p += rng.random_range(-jitter_band / 2.0..=jitter_band / 2.0);
        }

        p.clamp(MIN_CORRECT_PROBABILITY, MAX_CORRECT_PROBABILITY)
    }

    /// Bernoulli draw: will this bot answer the current question correctly?
    pub async fn decide_correctness(&self, profile: &BotProfile, ctx: &AnswerContext) -> bool {
        let state = self.run_state(&profile.id).await;
        let p = self.correctness_probability(profile, &state, ctx);
        let mut rng = rand::rng();
        rng.random_bool(p as f64)
    }

    /// Select an answer index, a pre-submission delay, and a reason tag.
    ///
    /// The four-way branch is the behavioral contract:
    /// - correct index known, draw says correct: select it
    /// - correct index known, draw says incorrect: uniform among the rest
    /// - correct index unknown, draw says correct: weighted draw favoring
    ///   earlier-listed options
    /// - correct index unknown, draw says incorrect: uniform at random
    pub async fn select_answer(
        &self,
        profile: &BotProfile,
        option_count: usize,
        correct_index: Option<usize>,
        ctx: &AnswerContext,
    ) -> AnswerChoice {
        debug_assert!(option_count > 0, "select_answer requires options");
        let wants_correct = self.decide_correctness(profile, ctx).await;
        let delay = self.answer_delay(profile, ctx.difficulty);

        let (index, reason) = match (correct_index, wants_correct) {
            (Some(correct), true) => (correct, AnswerReason::Known),
            (Some(correct), false) => {
                (pick_other_index(option_count, correct), AnswerReason::DeliberateMiss)
            }
            (None, true) => (pick_weighted_early(option_count), AnswerReason::WeightedGuess),
            (None, false) => {
                let mut rng = rand::rng();
                (rng.random_range(0..option_count), AnswerReason::RandomGuess)
            }
        };

        AnswerChoice {
            index,
            delay,
            expected_correct: wants_correct,
            reason,
        }
    }

    /// Update a profile's streak and fatigue after an answer outcome
    pub async fn record_answer(&self, profile_id: &str, was_correct: bool) {
        let mut states = self.states.write().await;
        states
            .entry(profile_id.to_string())
            .or_default()
            .record(was_correct);
    }

    /// Compute the pre-submission delay for one answer.
    ///
    /// base = reaction average, plus jitter scaled to the reaction range,
    /// plus a difficulty-proportional increment, times the personality
    /// factor, clamped to [min, max].
    pub fn answer_delay(&self, profile: &BotProfile, difficulty: f32) -> Duration {
        let rt = &profile.reaction_time;
        let mut rng = rand::rng();

        let range = rt.max_ms.saturating_sub(rt.min_ms) as f32;
        let jitter = if range > 0.0 {
            rng.random_range(-range / 4.0..=range / 4.0)
        } else {
            0.0
        };

        let base = rt.avg_ms as f32
            + jitter
            + difficulty.clamp(0.0, 1.0) * self.config.difficulty_delay_ms as f32;

        let factor = match profile.personality {
            Personality::Fast => 0.7,
            Personality::Cautious => 1.3,
            Personality::Random => 0.5 + rng.random::<f32>(),
            Personality::Steady => 1.0,
        };

        let ms = (base * factor).clamp(rt.min_ms as f32, rt.max_ms as f32);
        Duration::from_millis(ms as u64)
    }

    /// Draw a join-timing decision for one agent.
    ///
    /// The no-show check strictly precedes the late-join check; reversing
    /// the order changes the outcome distributions and is a contract
    /// violation.
    pub fn join_timing(&self, profile: &BotProfile) -> JoinDecision {
        let mut rng = rand::rng();

        if rng.random_bool(profile.no_show_chance.clamp(0.0, 1.0) as f64) {
            return JoinDecision::NoShow;
        }

        if rng.random_bool(profile.late_join_chance.clamp(0.0, 1.0) as f64) {
            let (lo, hi) = self.config.late_join_ms;
            return JoinDecision::Late(Duration::from_millis(rng.random_range(lo..=hi)));
        }

        let (lo, hi) = self.config.on_time_join_ms;
        JoinDecision::OnTime(Duration::from_millis(rng.random_range(lo..=hi)))
    }
}

impl Default for BehaviorModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform pick among all indices except `exclude`
fn pick_other_index(option_count: usize, exclude: usize) -> usize {
    if option_count <= 1 {
        return 0;
    }
    let mut rng = rand::rng();
    let pick = rng.random_range(0..option_count - 1);
    if pick >= exclude { pick + 1 } else { pick }
}

/// Weighted draw favoring earlier-listed options: option i gets weight
/// n - i, so the first option is n times more likely than the last.
fn pick_weighted_early(option_count: usize) -> usize {
    let n = option_count;
    let total: usize = n * (n + 1) / 2;
    let mut rng = rand::rng();
    let mut roll = rng.random_range(0..total);
    for i in 0..n {
        let weight = n - i;
        if roll < weight {
            return i;
        }
        roll -= weight;
    }
    n - 1
}
