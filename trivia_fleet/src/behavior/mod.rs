//! Statistical behavior model and bot profile models.

pub mod decision;
pub mod models;

pub use decision::{
    AnswerChoice, AnswerContext, AnswerReason, BehaviorConfig, BehaviorModel, JoinDecision,
};
pub use models::{BotProfile, Personality, PlayerRunState, ProfileId, ReactionTime};
