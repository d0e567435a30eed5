//! Snapshot classification and phase transition tracking.

use super::GamePhase;
use crate::driver::{DriverError, GameDriver, PageSnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, sleep};

/// Interval between classification attempts in `wait_for_phase`
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

// Keyword sets matched against the lowercased rendered text. These track
// the platform's markup and are expected to need maintenance.
const WELCOME_BACK_KEYWORDS: &[&str] = &["welcome back", "continue playing", "rejoin"];
const GAME_ENDED_KEYWORDS: &[&str] = &[
    "game over",
    "final results",
    "thanks for playing",
    "game has ended",
];
const TIMES_UP_KEYWORDS: &[&str] = &["time's up", "time is up"];
const WAITING_KEYWORDS: &[&str] = &[
    "waiting for the game",
    "the game will start",
    "waiting room",
    "get ready",
    "hang tight",
];
const ERROR_KEYWORDS: &[&str] = &[
    "something went wrong",
    "connection lost",
    "unable to connect",
    "an error occurred",
    "try again later",
];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Classify a page snapshot into a phase.
///
/// The precedence order is the contract; when several signals apply at
/// once, the first matching rule wins:
///
/// 1. returning-player / welcome-back markers -> Registration
/// 2. registration form fields present -> Registration
/// 3. game-ended keywords -> GameEnded
/// 4. answer controls present and timer > 0 -> Question
/// 5. "your ranking" marker -> Ranking
/// 6. timer == 0 or "time's up" -> AnswerReveal
/// 7. waiting-room keywords -> Waiting
/// 8. a parsed timer exists but nothing above matched -> BetweenQuestions
/// 9. explicit error keywords -> Error
/// 10. signed-in-but-idle markers -> Waiting
/// 11. otherwise retain the previously committed phase
pub fn classify(snapshot: &PageSnapshot, committed: GamePhase) -> GamePhase {
    let text = snapshot.text.to_lowercase();

    if snapshot.has_welcome_back || contains_any(&text, WELCOME_BACK_KEYWORDS) {
        return GamePhase::Registration;
    }
    if snapshot.has_registration_fields {
        return GamePhase::Registration;
    }
    if contains_any(&text, GAME_ENDED_KEYWORDS) {
        return GamePhase::GameEnded;
    }
    if snapshot.answer_control_count > 0 && snapshot.countdown.is_some_and(|t| t > 0) {
        return GamePhase::Question;
    }
    if snapshot.has_ranking_marker {
        return GamePhase::Ranking;
    }
    if snapshot.countdown == Some(0) || contains_any(&text, TIMES_UP_KEYWORDS) {
        return GamePhase::AnswerReveal;
    }
    if contains_any(&text, WAITING_KEYWORDS) {
        return GamePhase::Waiting;
    }
    if snapshot.countdown.is_some() {
        return GamePhase::BetweenQuestions;
    }
    if contains_any(&text, ERROR_KEYWORDS) {
        return GamePhase::Error;
    }
    if snapshot.signed_in_idle {
        return GamePhase::Waiting;
    }

    // Never flicker to Unknown on a transient unreadable page.
    committed
}

/// Phase wait failures
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("timed out after {waited:?} waiting for {targets:?}")]
    Timeout {
        waited: Duration,
        targets: Vec<GamePhase>,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Observer invoked on each committed transition with (from, to)
pub type TransitionObserver = Box<dyn Fn(GamePhase, GamePhase) + Send + Sync>;

/// Tracks the committed phase across classifications.
///
/// A transition only commits when the newly classified phase differs from
/// the committed one; committing into `Question` from any other phase
/// increments the question counter.
pub struct PhaseDetector {
    committed: GamePhase,
    previous: GamePhase,
    questions_seen: u32,
    observers: Vec<TransitionObserver>,
}

impl PhaseDetector {
    pub fn new() -> Self {
        Self {
            committed: GamePhase::Unknown,
            previous: GamePhase::Unknown,
            questions_seen: 0,
            observers: Vec::new(),
        }
    }

    /// The currently committed phase
    pub fn committed(&self) -> GamePhase {
        self.committed
    }

    /// The phase committed before the current one
    pub fn previous(&self) -> GamePhase {
        self.previous
    }

    /// How many times the detector has entered `Question`
    pub fn questions_seen(&self) -> u32 {
        self.questions_seen
    }

    /// Register a transition observer
    pub fn on_transition<F>(&mut self, observer: F)
    where
        F: Fn(GamePhase, GamePhase) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Snapshot the page and classify it, committing any transition
    pub async fn detect_phase(&mut self, driver: &dyn GameDriver) -> Result<GamePhase, DriverError> {
        let snapshot = driver.snapshot().await?;
        Ok(self.observe(&snapshot))
    }

    /// Classify an already-captured snapshot, committing any transition.
    /// Used by callers that fetch snapshots under their own retry policy.
    pub fn observe(&mut self, snapshot: &PageSnapshot) -> GamePhase {
        let phase = classify(snapshot, self.committed);
        self.commit(phase)
    }

    /// Commit a classified phase; no-op when it matches the committed one
    fn commit(&mut self, phase: GamePhase) -> GamePhase {
        if phase == self.committed {
            return phase;
        }

        self.previous = self.committed;
        self.committed = phase;

        if phase == GamePhase::Question {
            self.questions_seen += 1;
        }

        for observer in &self.observers {
            observer(self.previous, phase);
        }

        phase
    }

    /// Poll until one of `targets` is committed, or time out.
    ///
    /// `GameEnded` is always an implicit target: there is no point waiting
    /// for a question once the game is over.
    pub async fn wait_for_phase(
        &mut self,
        driver: &dyn GameDriver,
        targets: &[GamePhase],
        timeout: Duration,
    ) -> Result<GamePhase, PhaseError> {
        let started = Instant::now();
        loop {
            let phase = self.detect_phase(driver).await?;
            if phase == GamePhase::GameEnded || targets.contains(&phase) {
                return Ok(phase);
            }
            if started.elapsed() >= timeout {
                return Err(PhaseError::Timeout {
                    waited: started.elapsed(),
                    targets: targets.to_vec(),
                });
            }
            sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

impl Default for PhaseDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a background classification task
pub struct PhasePoller {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PhasePoller {
    /// Stop the poller and abort its task
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.abort();
    }

    /// Whether the poller is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

impl Drop for PhasePoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Launch a cancellable periodic background classification used for
/// continuous telemetry independent of explicit waits.
pub fn start_polling(
    detector: Arc<Mutex<PhaseDetector>>,
    driver: Arc<dyn GameDriver>,
    period: Duration,
) -> PhasePoller {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        while flag.load(Ordering::SeqCst) {
            ticker.tick().await;
            let mut detector = detector.lock().await;
            if let Err(e) = detector.detect_phase(driver.as_ref()).await {
                log::debug!("background phase poll failed: {e}");
            }
        }
    });

    PhasePoller { running, handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PageSnapshot {
        PageSnapshot::default()
    }

    #[test]
    fn test_game_ended_beats_live_question_signals() {
        // Rule 3 precedes rule 4: simultaneous "game over" text and
        // visible answer controls with a running timer resolve to ended.
        let snap = PageSnapshot {
            text: "Game over! Final results are in".to_string(),
            answer_control_count: 4,
            countdown: Some(12),
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Unknown), GamePhase::GameEnded);
    }

    #[test]
    fn test_welcome_back_beats_everything() {
        let snap = PageSnapshot {
            text: "welcome back! game over".to_string(),
            answer_control_count: 4,
            countdown: Some(10),
            has_ranking_marker: true,
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Question), GamePhase::Registration);
    }

    #[test]
    fn test_registration_fields() {
        let snap = PageSnapshot {
            has_registration_fields: true,
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Unknown), GamePhase::Registration);
    }

    #[test]
    fn test_live_question() {
        let snap = PageSnapshot {
            answer_control_count: 4,
            countdown: Some(15),
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Waiting), GamePhase::Question);
    }

    #[test]
    fn test_question_beats_ranking_marker() {
        let snap = PageSnapshot {
            answer_control_count: 2,
            countdown: Some(5),
            has_ranking_marker: true,
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Unknown), GamePhase::Question);
    }

    #[test]
    fn test_timer_zero_is_answer_reveal() {
        let snap = PageSnapshot {
            answer_control_count: 4,
            countdown: Some(0),
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Question), GamePhase::AnswerReveal);
    }

    #[test]
    fn test_times_up_text_is_answer_reveal() {
        let snap = PageSnapshot {
            text: "Time's up! The answer was B".to_string(),
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Question), GamePhase::AnswerReveal);
    }

    #[test]
    fn test_lone_timer_is_between_questions() {
        let snap = PageSnapshot {
            countdown: Some(8),
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Unknown), GamePhase::BetweenQuestions);
    }

    #[test]
    fn test_error_keywords() {
        let snap = PageSnapshot {
            text: "Something went wrong. Please refresh.".to_string(),
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Question), GamePhase::Error);
    }

    #[test]
    fn test_signed_in_idle_is_waiting() {
        let snap = PageSnapshot {
            signed_in_idle: true,
            ..snapshot()
        };
        assert_eq!(classify(&snap, GamePhase::Unknown), GamePhase::Waiting);
    }

    #[test]
    fn test_no_signal_retains_committed_phase() {
        // An empty transient read must not flicker the phase.
        let snap = snapshot();
        assert_eq!(classify(&snap, GamePhase::Question), GamePhase::Question);
        assert_eq!(classify(&snap, GamePhase::Ranking), GamePhase::Ranking);
        assert_eq!(classify(&snap, GamePhase::Unknown), GamePhase::Unknown);
    }

    #[test]
    fn test_commit_counts_question_entries() {
        let mut detector = PhaseDetector::new();
        detector.commit(GamePhase::Waiting);
        detector.commit(GamePhase::Question);
        assert_eq!(detector.questions_seen(), 1);

        // Re-committing Question is a no-op
        detector.commit(GamePhase::Question);
        assert_eq!(detector.questions_seen(), 1);

        detector.commit(GamePhase::Ranking);
        detector.commit(GamePhase::Question);
        assert_eq!(detector.questions_seen(), 2);
        assert_eq!(detector.previous(), GamePhase::Ranking);
        assert_eq!(detector.committed(), GamePhase::Question);
    }

    #[test]
    fn test_observers_fire_on_transition_only() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let fired = Arc::new(AtomicU32::new(0));
        let mut detector = PhaseDetector::new();
        let counter = fired.clone();
        detector.on_transition(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        detector.commit(GamePhase::Waiting);
        detector.commit(GamePhase::Waiting);
        detector.commit(GamePhase::Question);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
