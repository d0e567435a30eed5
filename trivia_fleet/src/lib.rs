//! # Trivia Fleet
//!
//! An orchestration engine for fleets of automated players ("bots") that
//! each independently join and play a live, time-gated trivia event on a
//! third-party web platform, producing human-plausible answer timing,
//! accuracy, and behavioral variance at scale.
//!
//! ## Architecture
//!
//! Dependency order, leaves first:
//!
//! - [`behavior`]: pure decision functions producing delays and answer
//!   choices from a profile and per-profile run state
//! - [`phase`]: classifies the observed game phase from page snapshots
//!   with a fixed precedence order
//! - [`driver`]: the browser interface boundary, plus a scriptable
//!   in-memory implementation for tests and dry runs
//! - [`agent`]: per-bot supervisor driving one session end-to-end with a
//!   two-tier retry/recovery policy
//! - [`pool`]: admission-controlled fan-out bounding concurrent agents
//! - [`session`]: top-level lifecycle wrapper owning one pool per
//!   playthrough
//!
//! Collaborators at the edges: [`roster`] (profile ingestion),
//! [`persistence`] (optional result sink), [`recap`] (optional narrative
//! generation). All are explicit injected instances, never globals.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trivia_fleet::agent::AgentOptions;
//! use trivia_fleet::behavior::BehaviorModel;
//! use trivia_fleet::driver::sim::{SimDriverFactory, SimScript};
//! use trivia_fleet::pool::PoolOptions;
//! use trivia_fleet::roster::{GeneratedRoster, RosterSource};
//! use trivia_fleet::session::SessionCoordinator;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let roster = GeneratedRoster.load_profiles(5, None)?;
//! let coordinator = SessionCoordinator::new(
//!     "https://play.example/game/abc",
//!     roster,
//!     Arc::new(BehaviorModel::new()),
//!     Arc::new(SimDriverFactory::new(SimScript::quick_game(10))),
//!     AgentOptions::default(),
//!     PoolOptions::default(),
//!     None,
//!     None,
//! );
//! coordinator.initialize().await?;
//! let outcome = coordinator.start().await?;
//! println!("{} agents completed", outcome.agents_completed);
//! # Ok(())
//! # }
//! ```

/// Per-bot supervisors and the retry/recovery policy.
pub mod agent;
pub use agent::{Agent, AgentError, AgentOptions, AgentRecord, AgentResult};

/// Statistical behavior model and bot profiles.
pub mod behavior;
pub use behavior::{BehaviorModel, BotProfile, JoinDecision, PlayerRunState};

/// Environment-driven fleet configuration.
pub mod config;
pub use config::{ConfigError, FleetConfig, FleetOverrides};

/// Browser driver interface boundary.
pub mod driver;
pub use driver::{DriverError, DriverFactory, GameDriver};

/// Optional persistence sink.
pub mod persistence;
pub use persistence::{PgSessionSink, SessionSink};

/// Game phase classification.
pub mod phase;
pub use phase::{GamePhase, PhaseDetector};

/// Admission-controlled worker pool.
pub mod pool;
pub use pool::{PoolOptions, PoolResults, WorkerPool};

/// Optional post-game narrative generation.
pub mod recap;
pub use recap::RecapGenerator;

/// Roster ingestion boundary.
pub mod roster;
pub use roster::{GeneratedRoster, JsonRoster, RosterSource};

/// Session lifecycle coordination.
pub mod session;
pub use session::{SessionCoordinator, SessionOutcome, SessionRecord, SessionStatus};
