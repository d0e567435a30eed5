/// Property-based tests for the behavior model using proptest
///
/// These tests verify the statistical decision functions hold their
/// documented bounds across a wide range of randomly generated profiles,
/// run states, and question contexts.
use proptest::prelude::*;
use std::collections::HashMap;
use trivia_fleet::behavior::{
    AnswerContext, BehaviorModel, BotProfile, JoinDecision, Personality, PlayerRunState,
    ReactionTime,
};

fn personality_strategy() -> impl Strategy<Value = Personality> {
    prop_oneof![
        Just(Personality::Fast),
        Just(Personality::Cautious),
        Just(Personality::Random),
        Just(Personality::Steady),
    ]
}

// Strategy for a reaction envelope with min <= avg <= max
fn reaction_time_strategy() -> impl Strategy<Value = ReactionTime> {
    (100u64..10_000, 0u64..10_000, 0u64..10_000).prop_map(|(min, spread_a, spread_b)| {
        let (lo, hi) = if spread_a <= spread_b {
            (spread_a, spread_b)
        } else {
            (spread_b, spread_a)
        };
        ReactionTime {
            min_ms: min,
            avg_ms: min + lo,
            max_ms: min + hi.max(lo),
        }
    })
}

fn profile_strategy() -> impl Strategy<Value = BotProfile> {
    (
        0.0f32..=1.0,
        0.0f32..=1.0,
        personality_strategy(),
        reaction_time_strategy(),
        0.0f32..=1.0,
        0.0f32..=1.0,
    )
        .prop_map(
            |(accuracy, consistency, personality, reaction_time, no_show, late)| BotProfile {
                id: "prop".to_string(),
                name: "PropBot".to_string(),
                accuracy,
                category_accuracy: HashMap::new(),
                reaction_time,
                personality,
                consistency,
                no_show_chance: no_show,
                late_join_chance: late,
                team: None,
            },
        )
}

// Arbitrary run state, including extreme streaks and heavy fatigue
fn run_state_strategy() -> impl Strategy<Value = PlayerRunState> {
    (-25i32..=25, 0.0f32..=2.0, 0u32..=100).prop_map(|(streak, fatigue, answered)| {
        PlayerRunState {
            questions_answered: answered,
            correct_answers: answered / 2,
            streak,
            fatigue,
        }
    })
}

proptest! {
    #[test]
    fn correctness_probability_always_clamped(
        profile in profile_strategy(),
        state in run_state_strategy(),
        difficulty in 0.0f32..=1.0,
    ) {
        let model = BehaviorModel::new();
        let ctx = AnswerContext { category: None, difficulty };
        let p = model.correctness_probability(&profile, &state, &ctx);
        prop_assert!((0.10..=0.95).contains(&p), "probability {p} out of bounds");
    }

    #[test]
    fn hot_and_cold_are_mutually_exclusive(outcomes in prop::collection::vec(any::<bool>(), 0..50)) {
        let mut state = PlayerRunState::default();
        for outcome in outcomes {
            state.record(outcome);
            prop_assert!(!(state.is_hot() && state.is_cold()));
            if state.is_hot() {
                prop_assert!(state.streak >= 3);
            }
            if state.is_cold() {
                prop_assert!(state.streak <= -3);
            }
        }
    }

    #[test]
    fn certain_no_show_always_skips(mut profile in profile_strategy(), late in 0.0f32..=1.0) {
        profile.no_show_chance = 1.0;
        profile.late_join_chance = late;
        let model = BehaviorModel::new();
        prop_assert_eq!(model.join_timing(&profile), JoinDecision::NoShow);
    }

    #[test]
    fn answer_delay_stays_in_envelope(
        profile in profile_strategy(),
        difficulty in 0.0f32..=1.0,
    ) {
        let model = BehaviorModel::new();
        let delay = model.answer_delay(&profile, difficulty);
        let ms = delay.as_millis() as u64;
        prop_assert!(
            ms >= profile.reaction_time.min_ms && ms <= profile.reaction_time.max_ms,
            "delay {ms}ms outside [{}, {}] for {:?}",
            profile.reaction_time.min_ms,
            profile.reaction_time.max_ms,
            profile.personality
        );
    }

    #[test]
    fn streak_magnitude_never_exceeds_answers(outcomes in prop::collection::vec(any::<bool>(), 0..50)) {
        let mut state = PlayerRunState::default();
        for outcome in &outcomes {
            state.record(*outcome);
        }
        prop_assert!(state.streak.unsigned_abs() <= state.questions_answered);
        prop_assert!(state.correct_answers <= state.questions_answered);
    }
}
