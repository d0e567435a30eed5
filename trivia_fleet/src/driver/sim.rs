//! Scriptable in-memory game driver.
//!
//! Plays back a scripted trivia game against the orchestration core
//! without a browser. Integration tests use it to exercise agent, pool,
//! and coordinator behavior, including failure injection; the runner's
//! dry-run mode uses it as a harness.

use super::{
    AnswerModality, AnswerOptions, DriverError, DriverFactory, GameDriver, PageSnapshot,
};
use crate::behavior::BotProfile;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// How many ranking snapshots are served between questions before the
/// scripted game advances
const RANKING_POLLS_PER_QUESTION: u32 = 2;

/// One scripted question
#[derive(Debug, Clone)]
pub struct SimQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub correct: usize,
}

impl SimQuestion {
    pub fn new(text: &str, options: &[&str], correct: usize) -> Self {
        Self {
            text: text.to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct,
        }
    }
}

/// Script describing the game a [`SimDriver`] plays back
#[derive(Debug, Clone)]
pub struct SimScript {
    /// Questions in play order
    pub questions: Vec<SimQuestion>,

    /// How many initial navigations fail before one succeeds
    pub failing_navigations: u32,

    /// Whether injected navigation failures are session-loss (recoverable)
    /// or transient (ordinary retry) errors
    pub recoverable_failures: bool,

    /// Serve an error screen on every snapshot after the bot joins
    pub error_screen_after_join: bool,

    /// Serve a lone lobby countdown on every snapshot after the bot
    /// joins; the game never starts
    pub stuck_in_lobby: bool,

    /// Countdown value shown on live questions
    pub countdown_secs: u32,
}

impl SimScript {
    /// A clean playable game with `n` generic questions
    pub fn quick_game(n: usize) -> Self {
        let questions = (0..n)
            .map(|i| {
                SimQuestion::new(
                    &format!("Question {}?", i + 1),
                    &["Alpha", "Bravo", "Charlie", "Delta"],
                    i % 4,
                )
            })
            .collect();
        Self {
            questions,
            failing_navigations: 0,
            recoverable_failures: false,
            error_screen_after_join: false,
            stuck_in_lobby: false,
            countdown_secs: 15,
        }
    }

    /// A game that shows a permanent error screen after the join
    pub fn error_loop() -> Self {
        Self {
            error_screen_after_join: true,
            ..Self::quick_game(3)
        }
    }

    /// A lobby whose countdown never resolves into a first question
    pub fn stuck_lobby() -> Self {
        Self {
            stuck_in_lobby: true,
            ..Self::quick_game(3)
        }
    }

    /// Fail the first `n` navigations with session-loss errors
    pub fn with_session_losses(mut self, n: u32) -> Self {
        self.failing_navigations = n;
        self.recoverable_failures = true;
        self
    }

    /// Fail the first `n` navigations with transient errors
    pub fn with_transient_failures(mut self, n: u32) -> Self {
        self.failing_navigations = n;
        self.recoverable_failures = false;
        self
    }
}

/// Counters shared by every driver a [`SimDriverFactory`] creates.
/// Failure injection and concurrency accounting survive agent recovery,
/// which replaces driver instances.
#[derive(Debug, Default)]
pub struct SimStats {
    /// Total navigation attempts across all sessions
    pub navigation_attempts: AtomicU32,

    /// Remaining injected navigation failures
    pub failing_navigations_left: AtomicU32,

    /// Total successful join clicks
    pub joins: AtomicU32,

    /// Currently open sessions
    pub live_sessions: AtomicUsize,

    /// High-water mark of simultaneously open sessions
    pub max_live_sessions: AtomicUsize,

    /// Total answers submitted
    pub answers_submitted: AtomicU32,
}

impl SimStats {
    fn session_opened(&self) {
        let live = self.live_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_sessions.fetch_max(live, Ordering::SeqCst);
    }

    fn session_closed(&self) {
        self.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }

    /// Take one injected navigation failure if any are left
    fn take_navigation_failure(&self) -> bool {
        self.failing_navigations_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Creates [`SimDriver`] sessions that all play the same script
pub struct SimDriverFactory {
    script: Arc<SimScript>,
    stats: Arc<SimStats>,
}

impl SimDriverFactory {
    pub fn new(script: SimScript) -> Self {
        let stats = SimStats {
            failing_navigations_left: AtomicU32::new(script.failing_navigations),
            ..SimStats::default()
        };
        Self {
            script: Arc::new(script),
            stats: Arc::new(stats),
        }
    }

    /// Shared counters for test assertions
    pub fn stats(&self) -> Arc<SimStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl DriverFactory for SimDriverFactory {
    async fn create(&self) -> Result<Arc<dyn GameDriver>, DriverError> {
        self.stats.session_opened();
        Ok(Arc::new(SimDriver {
            script: self.script.clone(),
            stats: self.stats.clone(),
            open: AtomicBool::new(true),
            navigated: AtomicBool::new(false),
            state: Mutex::new(GameProgress::default()),
        }))
    }
}

/// Per-session playback position
#[derive(Debug, Default)]
struct GameProgress {
    joined: bool,
    current_question: usize,
    answered_current: bool,
    ranking_polls: u32,
    last_answer_correct: Option<bool>,
    score: i64,
}

/// One simulated browser session
pub struct SimDriver {
    script: Arc<SimScript>,
    stats: Arc<SimStats>,
    open: AtomicBool,
    navigated: AtomicBool,
    state: Mutex<GameProgress>,
}

impl SimDriver {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::SessionLost("browser has closed".to_string()))
        }
    }

    fn ensure_ready(&self) -> Result<(), DriverError> {
        self.ensure_open()?;
        if self.navigated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DriverError::Transient("no page loaded".to_string()))
        }
    }
}

#[async_trait]
impl GameDriver for SimDriver {
    async fn navigate_to_game(&self, _url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.stats.navigation_attempts.fetch_add(1, Ordering::SeqCst);

        if self.stats.take_navigation_failure() {
            return Err(if self.script.recoverable_failures {
                DriverError::SessionLost("target closed during navigation".to_string())
            } else {
                DriverError::Transient("navigation timed out".to_string())
            });
        }

        self.navigated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;

        if !state.joined {
            return Ok(PageSnapshot {
                text: "enter your name to join the game".to_string(),
                has_registration_fields: true,
                ..PageSnapshot::default()
            });
        }

        if self.script.error_screen_after_join {
            return Ok(PageSnapshot {
                text: "something went wrong. try again later.".to_string(),
                ..PageSnapshot::default()
            });
        }

        if self.script.stuck_in_lobby {
            return Ok(PageSnapshot {
                text: format!("starting in {}", self.script.countdown_secs),
                countdown: Some(self.script.countdown_secs),
                ..PageSnapshot::default()
            });
        }

        if state.current_question >= self.script.questions.len() {
            return Ok(PageSnapshot {
                text: "game over! final results".to_string(),
                ..PageSnapshot::default()
            });
        }

        if state.answered_current {
            state.ranking_polls += 1;
            if state.ranking_polls >= RANKING_POLLS_PER_QUESTION {
                state.current_question += 1;
                state.answered_current = false;
                state.ranking_polls = 0;
            }
            return Ok(PageSnapshot {
                text: "your ranking".to_string(),
                has_ranking_marker: true,
                ..PageSnapshot::default()
            });
        }

        let question = &self.script.questions[state.current_question];
        Ok(PageSnapshot {
            text: question.text.clone(),
            answer_control_count: question.options.len(),
            countdown: Some(self.script.countdown_secs),
            ..PageSnapshot::default()
        })
    }

    async fn detect_registration_present(&self) -> Result<bool, DriverError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        Ok(!state.joined)
    }

    async fn fill_registration_form(&self, _profile: &BotProfile) -> Result<(), DriverError> {
        self.ensure_ready()
    }

    async fn click_join(&self) -> Result<bool, DriverError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        state.joined = true;
        self.stats.joins.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn handle_returning_player(&self) -> Result<bool, DriverError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        state.joined = true;
        Ok(true)
    }

    async fn question_text(&self) -> Result<String, DriverError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        self.script
            .questions
            .get(state.current_question)
            .filter(|_| !state.answered_current)
            .map(|q| q.text.clone())
            .ok_or_else(|| DriverError::Transient("no question on screen".to_string()))
    }

    async fn answer_options(&self) -> Result<AnswerOptions, DriverError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        let question = self
            .script
            .questions
            .get(state.current_question)
            .filter(|_| !state.answered_current)
            .ok_or_else(|| DriverError::Transient("no answer controls on screen".to_string()))?;
        Ok(AnswerOptions {
            modality: AnswerModality::MultipleChoice,
            options: question.options.clone(),
        })
    }

    async fn submit_answer(
        &self,
        index: usize,
        _modality: AnswerModality,
    ) -> Result<bool, DriverError> {
        self.ensure_ready()?;
        let mut state = self.state.lock().await;
        let question = self
            .script
            .questions
            .get(state.current_question)
            .ok_or_else(|| DriverError::Transient("no question to answer".to_string()))?;

        let correct = index == question.correct;
        state.answered_current = true;
        state.ranking_polls = 0;
        state.last_answer_correct = Some(correct);
        if correct {
            state.score += 100;
        }
        self.stats.answers_submitted.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn check_answer_result(&self) -> Result<Option<bool>, DriverError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        Ok(state.last_answer_correct)
    }

    async fn current_score(&self) -> Result<Option<i64>, DriverError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        Ok(Some(state.score))
    }

    async fn ranking_text(&self) -> Result<String, DriverError> {
        self.ensure_ready()?;
        let state = self.state.lock().await;
        Ok(format!("You're in 3rd place with {} points!", state.score))
    }

    async fn teardown(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.stats.session_closed();
        }
    }
}
