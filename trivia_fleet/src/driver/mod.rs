//! Browser driver interface boundary.
//!
//! The orchestration core never talks to a browser directly; it goes
//! through [`GameDriver`], which a deployment backs with a real browser
//! automation stack. [`sim`] provides a scriptable in-memory
//! implementation used by the test suite and the runner's dry-run mode.

pub mod sim;

use crate::behavior::BotProfile;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Known error-message signatures that indicate the browser session
/// itself is gone and a full teardown-and-reinit is required.
const SESSION_LOSS_SIGNATURES: &[&str] = &[
    "session deleted",
    "session not found",
    "target closed",
    "browser has closed",
    "disconnected",
    "tab crashed",
];

/// Driver failures, classified for the two-tier retry policy
#[derive(Debug, Error)]
pub enum DriverError {
    /// Transient failure; retried with backoff, no teardown
    #[error("transient driver failure: {0}")]
    Transient(String),

    /// The browser session is gone; requires full teardown and reinit
    #[error("browser session lost: {0}")]
    SessionLost(String),

    /// The page is in a state the driver cannot act on
    #[error("unsupported page state: {0}")]
    Unsupported(String),
}

impl DriverError {
    /// Whether this failure requires the full recovery path (teardown,
    /// reinit, re-navigation) rather than an in-place retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SessionLost(_) => true,
            Self::Transient(msg) | Self::Unsupported(msg) => {
                let lower = msg.to_lowercase();
                SESSION_LOSS_SIGNATURES.iter().any(|sig| lower.contains(sig))
            }
        }
    }
}

/// Detected input modality of the current question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerModality {
    MultipleChoice,
    TrueFalse,
    Numeric,
    FreeText,
    DragReorder,
    Clickable,
    Image,
}

/// The enumerated options for the current question
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    /// How answers are submitted on this page
    pub modality: AnswerModality,

    /// Option labels in display order
    pub options: Vec<String>,
}

/// Raw page signals the phase detector classifies from.
///
/// One snapshot per classification; the detector never holds on to page
/// state between calls.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    /// Visible rendered text, lowercased by the driver
    pub text: String,

    /// Number of visible answer controls
    pub answer_control_count: usize,

    /// Whether a "your ranking" marker is visible
    pub has_ranking_marker: bool,

    /// Parsed countdown timer value, if one is visible
    pub countdown: Option<u32>,

    /// Whether registration form fields are present
    pub has_registration_fields: bool,

    /// Whether a returning-player / welcome-back marker is visible
    pub has_welcome_back: bool,

    /// Whether the player appears signed in but idle
    pub signed_in_idle: bool,
}

/// One bot's exclusive handle to its browser session.
///
/// Any call may fail transiently or recoverably; callers run driver
/// operations under the agent's retry policy. Implementations use
/// interior mutability so handles can be shared between the dispatch
/// loop and the background phase poller.
#[async_trait]
pub trait GameDriver: Send + Sync {
    /// Navigate to the game URL
    async fn navigate_to_game(&self, url: &str) -> Result<(), DriverError>;

    /// Capture the current page signals for phase classification
    async fn snapshot(&self) -> Result<PageSnapshot, DriverError>;

    /// Whether a registration form is currently present
    async fn detect_registration_present(&self) -> Result<bool, DriverError>;

    /// Fill the registration form with the profile's identity
    async fn fill_registration_form(&self, profile: &BotProfile) -> Result<(), DriverError>;

    /// Click the join control; returns whether the click landed
    async fn click_join(&self) -> Result<bool, DriverError>;

    /// Re-invoke the continuation control on a mid-game "welcome back"
    /// screen; returns whether the click landed
    async fn handle_returning_player(&self) -> Result<bool, DriverError>;

    /// Read the current question text
    async fn question_text(&self) -> Result<String, DriverError>;

    /// Enumerate the current answer options and their input modality
    async fn answer_options(&self) -> Result<AnswerOptions, DriverError>;

    /// Submit the answer at `index` via the modality-appropriate control
    async fn submit_answer(&self, index: usize, modality: AnswerModality)
    -> Result<bool, DriverError>;

    /// Correctness signal for the last submitted answer; `None` when the
    /// platform gives no readable signal
    async fn check_answer_result(&self) -> Result<Option<bool>, DriverError>;

    /// Current score, if visible
    async fn current_score(&self) -> Result<Option<i64>, DriverError>;

    /// Raw ranking/points text for telemetry parsing
    async fn ranking_text(&self) -> Result<String, DriverError>;

    /// Release all browser resources. Idempotent; must tolerate a
    /// partially-initialized session.
    async fn teardown(&self);
}

/// Creates fresh driver sessions; the agent's recovery path re-creates
/// its driver through this after a session-breaking failure.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a new browser session
    async fn create(&self) -> Result<Arc<dyn GameDriver>, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lost_is_recoverable() {
        assert!(DriverError::SessionLost("browser died".to_string()).is_recoverable());
    }

    #[test]
    fn test_transient_is_ordinary() {
        assert!(!DriverError::Transient("element not found".to_string()).is_recoverable());
        assert!(!DriverError::Unsupported("no answer controls".to_string()).is_recoverable());
    }

    #[test]
    fn test_transient_with_session_loss_signature_is_recoverable() {
        let err = DriverError::Transient("WebDriver: Session deleted because of page crash".into());
        assert!(err.is_recoverable());
        let err = DriverError::Transient("Target closed while awaiting click".into());
        assert!(err.is_recoverable());
    }
}
