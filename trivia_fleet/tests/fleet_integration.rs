//! Integration tests for the agent, pool, and session coordinator.
//!
//! Every test drives the full orchestration stack against scripted
//! in-memory game sessions. Tests run on a paused tokio clock so the
//! modeled human delays (join timing, answer delays, recovery pauses)
//! advance instantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Mutex;
use trivia_fleet::agent::{Agent, AgentOptions};
use trivia_fleet::behavior::{BehaviorModel, BotProfile, Personality, ReactionTime};
use trivia_fleet::driver::DriverFactory;
use trivia_fleet::driver::sim::{SimDriverFactory, SimScript};
use trivia_fleet::persistence::{SessionSink, SinkError, StatusFields};
use trivia_fleet::phase::{GamePhase, PhaseDetector, start_polling};
use trivia_fleet::pool::{PoolOptions, WorkerPool};
use trivia_fleet::recap::SummaryRecap;
use trivia_fleet::session::{
    SessionCoordinator, SessionError, SessionRecord, SessionStatus,
};
use uuid::Uuid;

const GAME_URL: &str = "https://game.test/session-1";

fn profile(id: &str) -> BotProfile {
    BotProfile {
        id: id.to_string(),
        name: format!("Bot {id}"),
        accuracy: 0.8,
        category_accuracy: HashMap::new(),
        reaction_time: ReactionTime {
            min_ms: 200,
            max_ms: 1_000,
            avg_ms: 400,
        },
        personality: Personality::Steady,
        consistency: 1.0,
        no_show_chance: 0.0,
        late_join_chance: 0.0,
        team: None,
    }
}

fn agent_for(factory: &Arc<SimDriverFactory>, profile: BotProfile) -> Agent {
    Agent::new(
        profile,
        Arc::new(BehaviorModel::new()),
        factory.clone() as Arc<dyn DriverFactory>,
        AgentOptions::default(),
    )
}

fn pool_for(factory: &Arc<SimDriverFactory>) -> WorkerPool {
    WorkerPool::new(
        Arc::new(BehaviorModel::new()),
        factory.clone() as Arc<dyn DriverFactory>,
        AgentOptions::default(),
    )
}

fn coordinator_for(
    factory: &Arc<SimDriverFactory>,
    roster: Vec<BotProfile>,
    sink: Option<Arc<dyn SessionSink>>,
) -> SessionCoordinator {
    SessionCoordinator::new(
        GAME_URL,
        roster,
        Arc::new(BehaviorModel::new()),
        factory.clone() as Arc<dyn DriverFactory>,
        AgentOptions::default(),
        PoolOptions {
            stagger_range_ms: (0, 0),
            max_concurrent: 10,
        },
        sink,
        Some(Arc::new(SummaryRecap)),
    )
}

// === Single agent ===

#[tokio::test(start_paused = true)]
async fn test_agent_plays_full_game() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(3)));
    let agent = agent_for(&factory, profile("solo"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.joined);
    assert!(!record.no_show);
    assert!(record.result.error.is_none(), "{:?}", record.result.error);
    assert_eq!(record.result.questions_answered, 3);
    assert_eq!(record.phase, GamePhase::GameEnded);
    assert!(record.result.final_score.is_some());

    let stats = factory.stats();
    assert_eq!(stats.joins.load(Ordering::SeqCst), 1);
    assert_eq!(stats.answers_submitted.load(Ordering::SeqCst), 3);
    // The run tears its session down on exit
    assert_eq!(stats.live_sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_agent_recovers_from_session_loss_and_joins() {
    // Two session losses against a lifetime budget of three: the agent
    // tears down, waits, reinitializes, and still joins the game. The
    // confirmed join resets the budget counter.
    let factory = Arc::new(SimDriverFactory::new(
        SimScript::quick_game(2).with_session_losses(2),
    ));
    let agent = agent_for(&factory, profile("phoenix"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.joined);
    assert!(record.result.error.is_none(), "{:?}", record.result.error);
    assert_eq!(record.recoveries_used, 0, "join must reset the budget");
    assert_eq!(record.result.questions_answered, 2);
    assert_eq!(factory.stats().navigation_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_agent_retries_transient_failures_in_place() {
    // Transient failures use the ordinary backoff path, not recovery:
    // no teardown, no budget consumption.
    let factory = Arc::new(SimDriverFactory::new(
        SimScript::quick_game(1).with_transient_failures(2),
    ));
    let agent = agent_for(&factory, profile("stubborn"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.joined);
    assert!(record.result.error.is_none());
    assert_eq!(factory.stats().navigation_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_agent_fails_when_transient_retries_exhaust() {
    let factory = Arc::new(SimDriverFactory::new(
        SimScript::quick_game(1).with_transient_failures(3),
    ));
    let agent = agent_for(&factory, profile("unlucky"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(!record.joined);
    let error = record.result.error.expect("run should fail");
    assert!(error.contains("navigate"), "unexpected error: {error}");
}

#[tokio::test(start_paused = true)]
async fn test_agent_fails_when_recovery_budget_exhausts() {
    let factory = Arc::new(SimDriverFactory::new(
        SimScript::quick_game(1).with_session_losses(10),
    ));
    let agent = agent_for(&factory, profile("doomed"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(!record.joined);
    let error = record.result.error.expect("run should fail");
    assert!(
        error.contains("recovery budget"),
        "unexpected error: {error}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_agent_aborts_after_consecutive_error_screens() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::error_loop()));
    let agent = agent_for(&factory, profile("stuck"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.joined, "the join happens before the error loop");
    let error = record.result.error.expect("run should fail");
    assert!(
        error.contains("consecutive error screens"),
        "unexpected error: {error}"
    );
    assert_eq!(record.result.questions_answered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_game_start_timeout_fires_in_a_stuck_lobby() {
    // The lobby shows a lone countdown forever, which classifies as
    // BetweenQuestions rather than Waiting. The pre-game timeout must
    // still fire.
    let factory = Arc::new(SimDriverFactory::new(SimScript::stuck_lobby()));
    let agent = agent_for(&factory, profile("benched"));

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.joined);
    assert_eq!(record.questions_seen, 0);
    let error = record.result.error.expect("run should fail");
    assert!(
        error.contains("game to start"),
        "unexpected error: {error}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_show_agent_never_opens_a_session() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(2)));
    let mut no_show = profile("ghost");
    no_show.no_show_chance = 1.0;
    let agent = agent_for(&factory, no_show);

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.no_show);
    assert!(!record.joined);
    assert!(record.result.error.is_none(), "no-show is not a failure");
    assert_eq!(factory.stats().navigation_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_waits_at_least_thirty_seconds() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let mut late = profile("straggler");
    late.late_join_chance = 1.0;
    let agent = agent_for(&factory, late);

    let started = tokio::time::Instant::now();
    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(record.joined);
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_is_a_clean_exit() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(2)));
    let agent = agent_for(&factory, profile("hesitant"));
    agent.stop();

    agent.run(GAME_URL).await;

    let record = agent.snapshot_record().await;
    assert!(!record.joined);
    assert!(record.result.error.is_none(), "stop is not a failure");
    assert_eq!(factory.stats().joins.load(Ordering::SeqCst), 0);
}

// === Worker pool ===

#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_concurrency_ceiling() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(2)));
    let pool = pool_for(&factory);
    let profiles: Vec<BotProfile> = (0..5).map(|i| profile(&format!("bot-{i}"))).collect();
    assert_eq!(pool.add_agents(&profiles).await, 5);

    let options = PoolOptions {
        stagger_range_ms: (0, 0),
        max_concurrent: 2,
    };
    pool.start_all(GAME_URL, &options).await;

    let stats = factory.stats();
    assert!(
        stats.max_live_sessions.load(Ordering::SeqCst) <= 2,
        "ceiling breached: {} live sessions",
        stats.max_live_sessions.load(Ordering::SeqCst)
    );
    assert_eq!(stats.joins.load(Ordering::SeqCst), 5);

    let results = pool.results().await;
    assert_eq!(results.completed.len(), 5);
    assert!(results.failed.is_empty());
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_skips_duplicate_profile_ids() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let pool = pool_for(&factory);

    let added = pool
        .add_agents(&[profile("twin"), profile("twin"), profile("other")])
        .await;
    assert_eq!(added, 2);
    assert_eq!(pool.agent_count().await, 2);

    // Re-registering across calls is also rejected
    assert_eq!(pool.add_agents(&[profile("twin")]).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_isolates_per_agent_failure() {
    // Three injected transient failures exhaust the first agent's retry
    // attempts. With a ceiling of one the second agent starts afterwards,
    // sees a clean session, and finishes the game.
    let factory = Arc::new(SimDriverFactory::new(
        SimScript::quick_game(2).with_transient_failures(3),
    ));
    let pool = pool_for(&factory);
    pool.add_agents(&[profile("first"), profile("second")]).await;

    let options = PoolOptions {
        stagger_range_ms: (0, 0),
        max_concurrent: 1,
    };
    pool.start_all(GAME_URL, &options).await;

    let results = pool.results().await;
    assert_eq!(results.failed.len(), 1);
    assert_eq!(results.completed.len(), 1);
    assert_eq!(results.failed[0].profile_id, "first");
    assert_eq!(results.completed[0].result.questions_answered, 2);
}

// === Session coordinator ===

/// Test sink capturing every notification and save in memory
#[derive(Default)]
struct RecordingSink {
    statuses: Mutex<Vec<SessionStatus>>,
    saves: Mutex<Vec<SessionRecord>>,
}

#[async_trait::async_trait]
impl SessionSink for RecordingSink {
    async fn notify_status(
        &self,
        _session_id: Uuid,
        status: SessionStatus,
        _fields: &StatusFields,
    ) -> Result<(), SinkError> {
        self.statuses.lock().await.push(status);
        Ok(())
    }

    async fn save_session_result(&self, record: &SessionRecord) -> Result<(), SinkError> {
        self.saves.lock().await.push(record.clone());
        Ok(())
    }
}

/// Test sink that always fails
struct BrokenSink;

#[async_trait::async_trait]
impl SessionSink for BrokenSink {
    async fn notify_status(
        &self,
        _session_id: Uuid,
        _status: SessionStatus,
        _fields: &StatusFields,
    ) -> Result<(), SinkError> {
        Err(SinkError::Database(sqlx::Error::PoolClosed))
    }

    async fn save_session_result(&self, _record: &SessionRecord) -> Result<(), SinkError> {
        Err(SinkError::Database(sqlx::Error::PoolClosed))
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_lifecycle_happy_path() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(2)));
    let sink = Arc::new(RecordingSink::default());
    let roster = vec![profile("alice"), profile("bob")];
    let coordinator = coordinator_for(&factory, roster, Some(sink.clone()));

    assert_eq!(coordinator.record().await.status, SessionStatus::Idle);
    coordinator.initialize().await.unwrap();
    assert_eq!(coordinator.record().await.status, SessionStatus::Initializing);

    let outcome = coordinator.start().await.unwrap();
    assert_eq!(outcome.agents_completed, 2);
    assert_eq!(outcome.agents_failed, 0);
    assert_eq!(outcome.questions_answered, 4);

    let record = coordinator.record().await;
    assert_eq!(record.status, SessionStatus::Completed);
    assert!(record.started_at.is_some());
    assert!(record.ended_at.is_some());
    assert!(record.duration_secs.is_some());

    assert_eq!(
        *sink.statuses.lock().await,
        vec![SessionStatus::Running, SessionStatus::Completed]
    );
    let saves = sink.saves.lock().await;
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].status, SessionStatus::Completed);

    coordinator.cleanup().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_completes_despite_broken_sink() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let coordinator = coordinator_for(&factory, vec![profile("alice")], Some(Arc::new(BrokenSink)));

    coordinator.initialize().await.unwrap();
    let outcome = coordinator.start().await.unwrap();
    assert_eq!(outcome.agents_completed, 1);
    assert_eq!(coordinator.record().await.status, SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_session_rejects_out_of_order_transitions() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let coordinator = coordinator_for(&factory, vec![profile("alice")], None);

    // start before initialize
    assert!(matches!(
        coordinator.start().await,
        Err(SessionError::NotInitialized(SessionStatus::Idle))
    ));

    coordinator.initialize().await.unwrap();
    // double initialize
    assert!(matches!(
        coordinator.initialize().await,
        Err(SessionError::NotIdle(SessionStatus::Initializing))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_session_rejects_empty_roster() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let coordinator = coordinator_for(&factory, Vec::new(), None);

    coordinator.initialize().await.unwrap();
    match coordinator.start().await {
        Err(SessionError::Configuration(msg)) => assert!(msg.contains("roster")),
        other => panic!("expected a configuration error, got {other:?}"),
    }
    // Rejected without a status transition
    assert_eq!(coordinator.record().await.status, SessionStatus::Initializing);
}

#[tokio::test(start_paused = true)]
async fn test_stop_marks_session_stopped() {
    // A long game, stopped shortly after start. The stop wins the race
    // because every agent first sits out a join delay of at least a
    // second.
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(50)));
    let coordinator = Arc::new(coordinator_for(&factory, vec![profile("alice")], None));

    coordinator.initialize().await.unwrap();
    let runner = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.stop().await;
    runner.await.unwrap().unwrap();

    let record = coordinator.record().await;
    assert_eq!(record.status, SessionStatus::Stopped);
    assert_eq!(factory.stats().live_sessions.load(Ordering::SeqCst), 0);
}

// === Phase waiting and background polling ===

#[tokio::test(start_paused = true)]
async fn test_wait_for_phase_reaches_target() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let driver = factory.create().await.unwrap();
    driver.navigate_to_game(GAME_URL).await.unwrap();
    driver.click_join().await.unwrap();

    let mut detector = PhaseDetector::new();
    let phase = detector
        .wait_for_phase(
            driver.as_ref(),
            &[GamePhase::Question],
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    assert_eq!(phase, GamePhase::Question);
    assert_eq!(detector.questions_seen(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_phase_accepts_game_end_implicitly() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(0)));
    let driver = factory.create().await.unwrap();
    driver.navigate_to_game(GAME_URL).await.unwrap();
    driver.click_join().await.unwrap();

    let mut detector = PhaseDetector::new();
    let phase = detector
        .wait_for_phase(
            driver.as_ref(),
            &[GamePhase::Question],
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    assert_eq!(phase, GamePhase::GameEnded);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_phase_times_out() {
    // Nobody joins, so the page never leaves registration
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let driver = factory.create().await.unwrap();
    driver.navigate_to_game(GAME_URL).await.unwrap();

    let mut detector = PhaseDetector::new();
    let result = detector
        .wait_for_phase(
            driver.as_ref(),
            &[GamePhase::Question],
            Duration::from_secs(3),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_background_polling_commits_phases() {
    let factory = Arc::new(SimDriverFactory::new(SimScript::quick_game(1)));
    let driver = factory.create().await.unwrap();
    driver.navigate_to_game(GAME_URL).await.unwrap();

    let detector = Arc::new(Mutex::new(PhaseDetector::new()));
    let poller = start_polling(detector.clone(), driver.clone(), Duration::from_millis(100));

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(poller.is_running());
    assert_eq!(detector.lock().await.committed(), GamePhase::Registration);

    poller.stop();
    assert!(!poller.is_running());
}
