//! Fleet configuration.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration. CLI arguments override the environment, which overrides
//! the defaults.

use crate::agent::AgentOptions;
use crate::pool::PoolOptions;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors; fatal before any agent starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {var} ({hint})")]
    MissingRequired { var: String, hint: String },

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },
}

/// Complete fleet configuration
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Target game URL
    pub game_url: String,

    /// How many profiles to field
    pub max_players: usize,

    /// Hard ceiling on simultaneously active agents
    pub max_concurrent: usize,

    /// Run browsers headless
    pub headless: bool,

    /// Uniform stagger range between agent launches, in ms
    pub stagger_range_ms: (u64, u64),

    /// How long agents wait for the first question
    pub game_start_timeout: Duration,

    /// Database URL; enables the persistence sink when set
    pub database_url: Option<String>,
}

/// Overrides supplied by the CLI
#[derive(Debug, Clone, Default)]
pub struct FleetOverrides {
    pub game_url: Option<String>,
    pub max_players: Option<usize>,
    pub max_concurrent: Option<usize>,
}

impl FleetConfig {
    /// Load configuration from environment variables with CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when no game URL is configured anywhere, or when
    /// a numeric variable fails validation.
    pub fn from_env(overrides: FleetOverrides) -> Result<Self, ConfigError> {
        let game_url = overrides
            .game_url
            .or_else(|| std::env::var("TRIVIA_GAME_URL").ok())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "TRIVIA_GAME_URL".to_string(),
                hint: "pass --url or set TRIVIA_GAME_URL".to_string(),
            })?;

        let max_players = overrides
            .max_players
            .unwrap_or_else(|| parse_env_or("FLEET_MAX_PLAYERS", 20));
        let max_concurrent = overrides
            .max_concurrent
            .unwrap_or_else(|| parse_env_or("FLEET_MAX_CONCURRENT", 10));

        if max_players == 0 {
            return Err(ConfigError::Invalid {
                var: "FLEET_MAX_PLAYERS".to_string(),
                value: "0".to_string(),
            });
        }
        if max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                var: "FLEET_MAX_CONCURRENT".to_string(),
                value: "0".to_string(),
            });
        }

        let stagger_min = parse_env_or("FLEET_STAGGER_MIN_MS", 2_000);
        let stagger_max = parse_env_or("FLEET_STAGGER_MAX_MS", 15_000);
        if stagger_max < stagger_min {
            return Err(ConfigError::Invalid {
                var: "FLEET_STAGGER_MAX_MS".to_string(),
                value: stagger_max.to_string(),
            });
        }

        Ok(Self {
            game_url,
            max_players,
            max_concurrent,
            headless: parse_env_or("FLEET_HEADLESS", true),
            stagger_range_ms: (stagger_min, stagger_max),
            game_start_timeout: Duration::from_secs(parse_env_or(
                "FLEET_GAME_START_TIMEOUT_SECS",
                300,
            )),
            database_url: std::env::var("DATABASE_URL").ok(),
        })
    }

    /// Agent tuning derived from this configuration
    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            game_start_timeout: self.game_start_timeout,
            ..AgentOptions::default()
        }
    }

    /// Pool tuning derived from this configuration
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            stagger_range_ms: self.stagger_range_ms,
            max_concurrent: self.max_concurrent,
        }
    }
}

/// Parse an environment variable, falling back to a default on absence
/// or parse failure
fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
