//! Admission-controlled worker pool.
//!
//! The pool bounds how many agents run at once and staggers their
//! admission. The stagger emulates human arrival patterns and doubles as
//! a self-imposed rate limit against the target platform; the concurrency
//! bound is a hard backpressure ceiling, never exceeded even transiently.

use crate::agent::{Agent, AgentOptions, AgentRecord};
use crate::behavior::{BehaviorModel, BotProfile};
use crate::driver::DriverFactory;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Re-check interval for the busy-poll admission gate
const ADMISSION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Options for one fan-out
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Uniform delay range between consecutive agent launches, in ms
    pub stagger_range_ms: (u64, u64),

    /// Hard ceiling on simultaneously active agents
    pub max_concurrent: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            stagger_range_ms: (2_000, 15_000),
            max_concurrent: 10,
        }
    }
}

/// Aggregated per-profile outcomes, partitioned by recorded error
#[derive(Debug, Default)]
pub struct PoolResults {
    /// Agents that finished without a recorded error (including modeled
    /// no-shows)
    pub completed: Vec<AgentRecord>,

    /// Agents that recorded a terminal error
    pub failed: Vec<AgentRecord>,
}

impl PoolResults {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Bounds and supervises many concurrent agents.
///
/// At most one agent exists per profile id; registration of a given id is
/// serialized through the registration lock, and admission happens from a
/// single task so the concurrency ceiling cannot be raced past.
pub struct WorkerPool {
    behavior: Arc<BehaviorModel>,
    factory: Arc<dyn DriverFactory>,
    agent_options: AgentOptions,
    agents: Mutex<Vec<Arc<Agent>>>,
    registered: Mutex<HashSet<String>>,
    active: Arc<AtomicUsize>,
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        behavior: Arc<BehaviorModel>,
        factory: Arc<dyn DriverFactory>,
        agent_options: AgentOptions,
    ) -> Self {
        Self {
            behavior,
            factory,
            agent_options,
            agents: Mutex::new(Vec::new()),
            registered: Mutex::new(HashSet::new()),
            active: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(true),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register one agent per profile, in roster order. Duplicate profile
    /// ids are skipped with a warning, not an error.
    pub async fn add_agents(&self, profiles: &[BotProfile]) -> usize {
        let mut registered = self.registered.lock().await;
        let mut agents = self.agents.lock().await;
        let mut added = 0;

        for profile in profiles {
            if !registered.insert(profile.id.clone()) {
                log::warn!("profile '{}' already registered, skipping", profile.id);
                continue;
            }
            agents.push(Arc::new(Agent::new(
                profile.clone(),
                self.behavior.clone(),
                self.factory.clone(),
                self.agent_options.clone(),
            )));
            added += 1;
        }

        log::info!("registered {added} agents ({} total)", agents.len());
        added
    }

    /// How many agents are registered
    pub async fn agent_count(&self) -> usize {
        self.agents.lock().await.len()
    }

    /// How many agents are currently active
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Launch every registered agent against `url` and wait for all of
    /// them to finish.
    ///
    /// Before the i-th launch (i > 0) a uniform stagger delay is drawn;
    /// before any launch the admission gate busy-polls until the active
    /// count is below the ceiling. Launches are concurrent: the admission
    /// loop moves on to the next candidate without waiting for runs to
    /// complete, then joins every launched run before returning.
    pub async fn start_all(&self, url: &str, options: &PoolOptions) {
        let agents: Vec<Arc<Agent>> = self.agents.lock().await.clone();
        log::info!(
            "starting {} agents (max {} concurrent)",
            agents.len(),
            options.max_concurrent
        );

        for (i, agent) in agents.into_iter().enumerate() {
            if !self.running.load(Ordering::SeqCst) {
                log::info!("pool stopped, halting admission");
                break;
            }

            if i > 0 {
                let (lo, hi) = options.stagger_range_ms;
                let stagger = if hi > lo {
                    let mut rng = rand::rng();
                    rng.random_range(lo..=hi)
                } else {
                    lo
                };
                sleep(Duration::from_millis(stagger)).await;
            }

            // Busy-poll admission gate: hold the candidate until a slot
            // frees up. Single admitting task, so check-then-increment
            // cannot race the ceiling.
            while self.active.load(Ordering::SeqCst) >= options.max_concurrent {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                sleep(ADMISSION_POLL_INTERVAL).await;
            }
            if !self.running.load(Ordering::SeqCst) {
                log::info!("pool stopped, halting admission");
                break;
            }

            self.active.fetch_add(1, Ordering::SeqCst);
            let active = self.active.clone();
            let url = url.to_string();
            let id = agent.profile_id().to_string();
            log::debug!("admitting agent '{id}' ({} active)", self.active_count());

            let handle = tokio::spawn(async move {
                // Decrement on every exit path, including task abort.
                let _slot = ActiveSlot(active);
                agent.run(&url).await;
            });
            self.handles.lock().await.push(handle);
        }

        // Join all launched runs.
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                log::error!("agent task panicked: {e}");
            }
        }
        log::info!("all agent runs finished");
    }

    /// Halt further admission and forcibly cancel and tear down every
    /// registered agent, regardless of its phase. Safe to call at any
    /// point, including before `start_all` completes.
    pub async fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);

        let agents: Vec<Arc<Agent>> = self.agents.lock().await.clone();
        for agent in &agents {
            agent.stop();
        }

        // Forced layer: abort outstanding tasks, then tear down each
        // agent's resources. Cleanup tolerates partially-initialized and
        // already-torn-down agents.
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        for agent in &agents {
            agent.cleanup().await;
        }
        self.active.store(0, Ordering::SeqCst);
        log::info!("pool stopped, {} agents torn down", agents.len());
    }

    /// Release every agent's resources. Idempotent.
    pub async fn cleanup(&self) {
        let agents: Vec<Arc<Agent>> = self.agents.lock().await.clone();
        for agent in &agents {
            agent.cleanup().await;
        }
    }

    /// Partition agents into completed (no recorded error) and failed
    pub async fn results(&self) -> PoolResults {
        let agents: Vec<Arc<Agent>> = self.agents.lock().await.clone();
        let mut results = PoolResults::default();
        for agent in &agents {
            let record = agent.snapshot_record().await;
            if record.is_failed() {
                results.failed.push(record);
            } else {
                results.completed.push(record);
            }
        }
        results
    }
}

/// Decrements the active-agent gauge when dropped, so aborted tasks
/// release their slot too
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
