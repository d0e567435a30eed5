//! Roster ingestion boundary.
//!
//! The surrounding system backs this with a spreadsheet; the core only
//! sees [`RosterSource`], a synchronous, side-effect-free profile loader.
//! A JSON-file source and a generated source ship here so the fleet can
//! run without the spreadsheet collaborator.

use crate::behavior::{BotProfile, Personality, ReactionTime};
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Roster loading failures
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("failed to read roster file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid roster file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Optional filter applied while loading profiles
#[derive(Debug, Clone, Default)]
pub struct RosterFilter {
    /// Keep only profiles on this team
    pub team: Option<String>,
}

impl RosterFilter {
    fn matches(&self, profile: &BotProfile) -> bool {
        match &self.team {
            Some(team) => profile.team.as_deref() == Some(team.as_str()),
            None => true,
        }
    }
}

/// Synchronous, side-effect-free profile source
pub trait RosterSource: Send + Sync {
    /// Load up to `limit` profiles, applying the optional filter
    fn load_profiles(
        &self,
        limit: usize,
        filter: Option<&RosterFilter>,
    ) -> Result<Vec<BotProfile>, RosterError>;
}

/// Profiles stored as a JSON array of [`BotProfile`]
pub struct JsonRoster {
    path: PathBuf,
}

impl JsonRoster {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RosterSource for JsonRoster {
    fn load_profiles(
        &self,
        limit: usize,
        filter: Option<&RosterFilter>,
    ) -> Result<Vec<BotProfile>, RosterError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| RosterError::Io {
            path: self.path.clone(),
            source,
        })?;
        let profiles: Vec<BotProfile> =
            serde_json::from_str(&raw).map_err(|source| RosterError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let default_filter = RosterFilter::default();
        let filter = filter.unwrap_or(&default_filter);
        Ok(profiles
            .into_iter()
            .filter(|p| filter.matches(p))
            .take(limit)
            .collect())
    }
}

/// Generates plausible randomized profiles on demand
pub struct GeneratedRoster;

impl RosterSource for GeneratedRoster {
    fn load_profiles(
        &self,
        limit: usize,
        filter: Option<&RosterFilter>,
    ) -> Result<Vec<BotProfile>, RosterError> {
        let default_filter = RosterFilter::default();
        let filter = filter.unwrap_or(&default_filter);
        Ok((1..=limit)
            .map(generate_profile)
            .filter(|p| filter.matches(p))
            .collect())
    }
}

/// Generate one plausible profile
fn generate_profile(seq: usize) -> BotProfile {
    let prefixes = [
        "Quiz", "Brain", "Fact", "Trivia", "Night", "Sharp", "Lucky", "Clever", "Rapid", "Wise",
    ];
    let suffixes = [
        "Whiz", "Storm", "Finder", "Owl", "Hawk", "Fox", "Mind", "Champ", "Spark", "Sage",
    ];

    let mut rng = rand::rng();
    let prefix = prefixes[rng.random_range(0..prefixes.len())];
    let suffix = suffixes[rng.random_range(0..suffixes.len())];

    let personality = match rng.random_range(0..4) {
        0 => Personality::Fast,
        1 => Personality::Cautious,
        2 => Personality::Random,
        _ => Personality::Steady,
    };

    let avg_ms = rng.random_range(3_000..7_000);
    BotProfile {
        id: format!("bot-{seq}"),
        name: format!("{prefix}{suffix}_{seq}"),
        accuracy: rng.random_range(0.35..0.85),
        category_accuracy: HashMap::new(),
        reaction_time: ReactionTime {
            min_ms: 1_500,
            max_ms: 14_000,
            avg_ms,
        },
        personality,
        consistency: rng.random_range(0.4..0.95),
        no_show_chance: rng.random_range(0.0..0.10),
        late_join_chance: rng.random_range(0.0..0.25),
        team: None,
    }
}
