//! Agent lifecycle: join sequence, dispatch loop, retry and recovery.

use super::{AgentError, AgentRecord};
use crate::behavior::{AnswerContext, BehaviorModel, BotProfile, JoinDecision};
use crate::driver::{DriverError, DriverFactory, GameDriver};
use crate::phase::{GamePhase, PhaseDetector};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Granularity of cancellable sleeps; the cooperative stop flag is
/// re-checked this often during long waits
const SLEEP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Tuning for the agent lifecycle
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Ordinary retry attempts per operation
    pub max_attempts: u32,

    /// First backoff delay; doubles per attempt
    pub backoff_base: Duration,

    /// Agent-lifetime recovery budget, counted in attempts
    pub max_recoveries: u32,

    /// Fixed delay between teardown and reinit during recovery
    pub recovery_delay: Duration,

    /// Consecutive error-screen classifications before aborting
    pub error_phase_threshold: u32,

    /// Pause between dispatch-loop iterations
    pub dispatch_interval: Duration,

    /// How long to wait for the first question before giving up
    pub game_start_timeout: Duration,

    /// Pause between submitting an answer and reading its result
    pub result_check_delay: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            max_recoveries: 3,
            recovery_delay: Duration::from_secs(5),
            error_phase_threshold: 10,
            dispatch_interval: Duration::from_secs(1),
            game_start_timeout: Duration::from_secs(300),
            result_check_delay: Duration::from_millis(1_500),
        }
    }
}

/// Supervises one bot's run of a single playthrough.
///
/// `run` always tears down owned resources on exit, success or failure.
/// All mutable state sits behind locks so the pool can hold the agent in
/// an `Arc` and call `stop`/`cleanup` while the run is in flight.
pub struct Agent {
    profile: BotProfile,
    behavior: Arc<BehaviorModel>,
    factory: Arc<dyn DriverFactory>,
    options: AgentOptions,
    running: AtomicBool,
    driver: Mutex<Option<Arc<dyn GameDriver>>>,
    detector: Mutex<PhaseDetector>,
    record: Mutex<AgentRecord>,
    last_url: Mutex<Option<String>>,
}

impl Agent {
    pub fn new(
        profile: BotProfile,
        behavior: Arc<BehaviorModel>,
        factory: Arc<dyn DriverFactory>,
        options: AgentOptions,
    ) -> Self {
        let record = AgentRecord::new(profile.id.clone());
        let mut detector = PhaseDetector::new();
        let id = profile.id.clone();
        detector.on_transition(move |from, to| {
            log::debug!("[{id}] phase {from} -> {to}");
        });

        Self {
            profile,
            behavior,
            factory,
            options,
            running: AtomicBool::new(true),
            driver: Mutex::new(None),
            detector: Mutex::new(detector),
            record: Mutex::new(record),
            last_url: Mutex::new(None),
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile.id
    }

    /// Clear the cooperative run flag; the current operation finishes,
    /// then the dispatch loop exits
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Read-only snapshot of this agent's record
    pub async fn snapshot_record(&self) -> AgentRecord {
        self.record.lock().await.clone()
    }

    /// Execute the full lifecycle. Resources are always released on
    /// exit; terminal failures are recorded, never propagated.
    pub async fn run(&self, url: &str) {
        let outcome = self.execute(url).await;
        match outcome {
            Ok(()) => {}
            Err(AgentError::Stopped) => {
                log::info!("[{}] stopped before game end", self.profile.id);
            }
            Err(e) => {
                log::warn!("[{}] run failed: {e}", self.profile.id);
                let mut record = self.record.lock().await;
                record.result.error = Some(e.to_string());
            }
        }
        self.cleanup().await;
    }

    async fn execute(&self, url: &str) -> Result<(), AgentError> {
        self.behavior.reset_run_state(&self.profile.id).await;
        *self.last_url.lock().await = Some(url.to_string());

        // Join timing: the no-show check comes first by contract.
        match self.behavior.join_timing(&self.profile) {
            JoinDecision::NoShow => {
                log::info!("[{}] decided not to join", self.profile.id);
                self.record.lock().await.no_show = true;
                return Ok(());
            }
            JoinDecision::Late(delay) => {
                log::info!("[{}] joining late in {delay:?}", self.profile.id);
                self.sleep_cancellable(delay).await?;
            }
            JoinDecision::OnTime(delay) => {
                log::debug!("[{}] joining in {delay:?}", self.profile.id);
                self.sleep_cancellable(delay).await?;
            }
        }

        let url_owned = url.to_string();
        self.with_retry("navigate", move |d| {
            let url = url_owned.clone();
            async move { d.navigate_to_game(&url).await }
        })
        .await?;

        let phase = self.classify_phase().await?;
        if phase == GamePhase::Registration {
            self.join_game().await?;
        }

        self.dispatch_loop().await
    }

    /// Fill the registration form and click the join control, both under
    /// retry. A confirmed successful join resets the lifetime recovery
    /// budget; recoveries later in the game do not get a fresh budget.
    async fn join_game(&self) -> Result<(), AgentError> {
        let profile = self.profile.clone();
        self.with_retry("fill registration", move |d| {
            let profile = profile.clone();
            async move { d.fill_registration_form(&profile).await }
        })
        .await?;

        self.with_retry("click join", |d| async move {
            match d.click_join().await? {
                true => Ok(()),
                false => Err(DriverError::Transient(
                    "join control not clickable".to_string(),
                )),
            }
        })
        .await?;

        let mut record = self.record.lock().await;
        record.joined = true;
        record.recoveries_used = 0;
        log::info!("[{}] joined as '{}'", self.profile.id, self.profile.name);
        Ok(())
    }

    /// Repeatedly classify the current phase and dispatch on it until the
    /// game ends, the agent fails terminally, or the run flag clears.
    async fn dispatch_loop(&self) -> Result<(), AgentError> {
        let mut consecutive_errors = 0u32;
        let mut last_answered_question = 0u32;
        let waiting_since = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let phase = self.classify_phase().await?;
            let questions_seen = {
                let detector = self.detector.lock().await;
                detector.questions_seen()
            };
            {
                let mut record = self.record.lock().await;
                record.phase = phase;
                record.questions_seen = questions_seen;
            }

            if phase != GamePhase::Error {
                consecutive_errors = 0;
            }

            match phase {
                GamePhase::Question => {
                    if questions_seen == last_answered_question {
                        // Platform still showing a question we answered
                        self.sleep_cancellable(self.options.dispatch_interval).await?;
                        continue;
                    }
                    self.handle_question(questions_seen).await?;
                    last_answered_question = questions_seen;
                }
                GamePhase::Ranking
                | GamePhase::AnswerReveal
                | GamePhase::BetweenQuestions
                | GamePhase::Countdown
                | GamePhase::Waiting
                | GamePhase::Unknown => {
                    // Until the first question, every wait branch counts
                    // against the game-start timeout; a lobby stuck on a
                    // lone countdown must not park the agent forever.
                    if questions_seen == 0
                        && waiting_since.elapsed() >= self.options.game_start_timeout
                    {
                        return Err(AgentError::GameStartTimeout);
                    }
                    self.sleep_cancellable(self.options.dispatch_interval).await?;
                }
                GamePhase::Registration => {
                    // Mid-game "welcome back" screen
                    self.with_retry("returning player", |d| async move {
                        match d.handle_returning_player().await? {
                            true => Ok(()),
                            false => Err(DriverError::Transient(
                                "continuation control not clickable".to_string(),
                            )),
                        }
                    })
                    .await?;
                    self.sleep_cancellable(self.options.dispatch_interval).await?;
                }
                GamePhase::GameEnded => {
                    self.finish_game().await;
                    return Ok(());
                }
                GamePhase::Error => {
                    consecutive_errors += 1;
                    log::warn!(
                        "[{}] error screen ({consecutive_errors}/{})",
                        self.profile.id,
                        self.options.error_phase_threshold
                    );
                    if consecutive_errors >= self.options.error_phase_threshold {
                        return Err(AgentError::ErrorScreens {
                            count: consecutive_errors,
                        });
                    }
                    self.sleep_cancellable(self.options.dispatch_interval).await?;
                }
            }
        }

        Err(AgentError::Stopped)
    }

    /// Answer the question currently on screen
    async fn handle_question(&self, question_number: u32) -> Result<(), AgentError> {
        let question = self
            .with_retry("read question", |d| async move { d.question_text().await })
            .await?;
        let options = self
            .with_retry("read options", |d| async move { d.answer_options().await })
            .await?;

        if options.options.is_empty() {
            log::warn!("[{}] question with no options, skipping", self.profile.id);
            return Ok(());
        }

        let ctx = AnswerContext {
            category: None,
            // The platform exposes no difficulty; approximate by position
            // since later questions tend to be harder.
            difficulty: (0.3 + question_number as f32 * 0.05).min(0.9),
        };
        let choice = self
            .behavior
            .select_answer(&self.profile, options.options.len(), None, &ctx)
            .await;

        log::debug!(
            "[{}] q{question_number} '{question}': option {} ({:?}) after {:?}",
            self.profile.id,
            choice.index,
            choice.reason,
            choice.delay
        );

        self.sleep_cancellable(choice.delay).await?;

        let modality = options.modality;
        let index = choice.index;
        let submitted = self
            .with_retry("submit answer", move |d| async move {
                d.submit_answer(index, modality).await
            })
            .await?;
        if !submitted {
            log::warn!("[{}] answer submission not accepted", self.profile.id);
            return Ok(());
        }

        self.sleep_cancellable(self.options.result_check_delay).await?;

        // Correctness signal feeds the streak/fatigue update; when the
        // platform gives no readable signal, fall back to the model's
        // own drawn expectation.
        let signal = match self.current_driver().await {
            Ok(driver) => driver.check_answer_result().await.unwrap_or(None),
            Err(_) => None,
        };
        let was_correct = signal.unwrap_or(choice.expected_correct);
        self.behavior.record_answer(&self.profile.id, was_correct).await;

        {
            let mut record = self.record.lock().await;
            record.result.questions_answered += 1;
            if was_correct {
                record.result.correct_answers += 1;
            }
        }

        self.read_ranking_snapshot().await;
        Ok(())
    }

    /// Best-effort ranking/points telemetry; failure only reduces log
    /// fidelity
    async fn read_ranking_snapshot(&self) {
        let Ok(driver) = self.current_driver().await else {
            return;
        };
        match driver.ranking_text().await {
            Ok(text) => match parse_ranking(&text) {
                Some((rank, points)) => {
                    log::debug!(
                        "[{}] rank {rank} with {points} points",
                        self.profile.id
                    );
                    self.record.lock().await.result.final_rank = Some(rank);
                }
                None => log::debug!("[{}] unparsed ranking text: {text}", self.profile.id),
            },
            Err(e) => log::debug!("[{}] no ranking snapshot: {e}", self.profile.id),
        }
    }

    /// Record the final score and log the outcome
    async fn finish_game(&self) {
        let score = match self.current_driver().await {
            Ok(driver) => driver.current_score().await.unwrap_or(None),
            Err(_) => None,
        };
        let mut record = self.record.lock().await;
        record.result.final_score = score;
        log::info!(
            "[{}] game ended: {}/{} correct, score {:?}",
            self.profile.id,
            record.result.correct_answers,
            record.result.questions_answered,
            score
        );
    }

    /// Snapshot the page under retry and commit the classification
    async fn classify_phase(&self) -> Result<GamePhase, AgentError> {
        let snapshot = self
            .with_retry("read page", |d| async move { d.snapshot().await })
            .await?;
        let mut detector = self.detector.lock().await;
        Ok(detector.observe(&snapshot))
    }

    /// Run a driver operation under the two-tier retry policy.
    ///
    /// Ordinary failures retry in place with exponential backoff, up to a
    /// fixed attempt count. Recoverable failures (session loss) trigger
    /// the full teardown-and-reinit path, bounded by the agent-lifetime
    /// recovery budget rather than per-operation attempts.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut(Arc<dyn GameDriver>) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let mut attempts = 0u32;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Err(AgentError::Stopped);
            }

            let result = match self.current_driver().await {
                Ok(driver) => op(driver).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() => {
                    let used = {
                        let mut record = self.record.lock().await;
                        record.recoveries_used += 1;
                        record.recoveries_used
                    };
                    if used > self.options.max_recoveries {
                        return Err(AgentError::RecoveryBudgetExhausted {
                            used: used - 1,
                            last: e.to_string(),
                        });
                    }
                    log::warn!(
                        "[{}] {what}: {e}; recovering ({used}/{})",
                        self.profile.id,
                        self.options.max_recoveries
                    );
                    if let Err(re) = self.recover().await {
                        log::warn!("[{}] recovery attempt failed: {re}", self.profile.id);
                    }
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.options.max_attempts {
                        return Err(AgentError::RetriesExhausted {
                            what: what.to_string(),
                            attempts,
                            last: e.to_string(),
                        });
                    }
                    let backoff = self.options.backoff_base * 2u32.pow(attempts - 1);
                    log::debug!(
                        "[{}] {what}: {e}; retrying in {backoff:?} ({attempts}/{})",
                        self.profile.id,
                        self.options.max_attempts
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    /// Full recovery: silent teardown, fixed delay, fresh session,
    /// re-navigation to the last known URL
    async fn recover(&self) -> Result<(), DriverError> {
        self.teardown_driver().await;
        sleep(self.options.recovery_delay).await;

        let driver = self.factory.create().await?;
        *self.driver.lock().await = Some(driver.clone());

        let last_url = self.last_url.lock().await.clone();
        if let Some(url) = last_url {
            driver.navigate_to_game(&url).await?;
        }
        Ok(())
    }

    /// The current driver, opening a session if none exists
    async fn current_driver(&self) -> Result<Arc<dyn GameDriver>, DriverError> {
        let mut slot = self.driver.lock().await;
        if let Some(driver) = slot.as_ref() {
            return Ok(driver.clone());
        }
        let driver = self.factory.create().await?;
        *slot = Some(driver.clone());
        Ok(driver)
    }

    async fn teardown_driver(&self) {
        let driver = self.driver.lock().await.take();
        if let Some(driver) = driver {
            driver.teardown().await;
        }
    }

    /// Release all owned resources. Idempotent; swallows teardown errors
    /// and tolerates a partially-initialized agent.
    pub async fn cleanup(&self) {
        self.teardown_driver().await;
    }

    /// Sleep in short slices, bailing out when the run flag clears
    async fn sleep_cancellable(&self, total: Duration) -> Result<(), AgentError> {
        let deadline = Instant::now() + total;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Err(AgentError::Stopped);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            sleep(SLEEP_CHECK_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Parse a rank and points out of free-form ranking text, e.g.
/// "You're in 3rd place with 2500 points!"
fn parse_ranking(text: &str) -> Option<(u32, i64)> {
    let lower = text.to_lowercase();

    let rank = ["st place", "nd place", "rd place", "th place"]
        .iter()
        .find_map(|suffix| {
            let end = lower.find(suffix)?;
            let digits: String = lower[..end]
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            digits.parse().ok()
        })?;

    let points = lower.find("points").and_then(|end| {
        let digits: String = lower[..end]
            .trim_end()
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    })?;

    Some((rank, points))
}
