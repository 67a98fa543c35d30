//! Virtual-user scheduler.
//!
//! A single controller task owns the worker table. Every tick it compares the schedule's target
//! against the workers still running and adjusts:
//!
//! - ramp-up revives workers that were told to retire but have not exited yet, then spawns new
//!   workers at the lowest free id;
//! - ramp-down marks the highest-id running workers as retiring. They finish their current
//!   iteration and exit at the top of the loop.
//!
//! Reviving before spawning keeps the number of live workers at or below the largest target the
//! schedule has asked for.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{ConfigError, Result};
use crate::gate::RunGate;
use crate::progress::{PROGRESS_INTERVAL, ProgressFn, ProgressUpdate, StageProgress};
use crate::schedule::SchedulePolicy;
use crate::vu::{StartSignal, VirtualUser, WorkerSlot, WorkerState};

const CONTROLLER_TICK: Duration = Duration::from_millis(10);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(120);
const MAX_GRACE_PERIOD: Duration = Duration::from_secs(3600);

/// What one iteration did, for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub requests: u64,
    pub failed: u64,
}

/// The per-VU loop body.
pub trait Worker: Send + 'static {
    fn iteration(&mut self, iteration: u64) -> impl Future<Output = IterationReport> + Send;
}

/// Builds the worker for a newly admitted virtual user.
pub trait WorkerFactory: Send + Sync + 'static {
    type Worker: Worker;

    fn worker(&self, vu: VirtualUser) -> Self::Worker;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub scenario: String,
    pub policy: SchedulePolicy,
    /// How long in-flight iterations may drain after the deadline.
    pub grace_period: Duration,
    pub credential_pool_size: usize,
}

impl SchedulerConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.policy.validate()?;
        if self.credential_pool_size == 0 {
            return Err(ConfigError::EmptyCredentials);
        }
        if self.grace_period > MAX_GRACE_PERIOD {
            return Err(ConfigError::InvalidGracePeriod(self.grace_period));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub elapsed: Duration,
    pub peak_vus: u64,
    pub spawned_vus: u64,
    pub iterations: u64,
    /// Workers still mid-iteration when the grace period ran out.
    pub aborted_workers: u64,
}

#[derive(Debug, Default)]
struct RunCounters {
    iterations: AtomicU64,
    requests: AtomicU64,
    failed: AtomicU64,
}

struct WorkerHandle {
    slot: Arc<WorkerSlot>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && self.slot.state() != WorkerState::Exited
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    progress: Option<ProgressFn>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            progress: None,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Option<ProgressFn>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run<F: WorkerFactory>(&self, factory: Arc<F>) -> Result<RunResult> {
        let schedule = self.config.policy.schedule();
        let total = schedule.total_duration();
        let gate = Arc::new(RunGate::new(total));
        let start = Arc::new(StartSignal::new());
        let counters = Arc::new(RunCounters::default());

        let mut table = WorkerTable {
            workers: BTreeMap::new(),
            factory,
            gate: gate.clone(),
            start: start.clone(),
            counters: counters.clone(),
            pool_size: self.config.credential_pool_size,
            spawned: 0,
            peak: 0,
        };

        // Fixed runs admit every VU before t0.
        table.adjust(schedule.target_at(Duration::ZERO));

        let started = gate.start();
        start.start();
        tracing::info!(
            scenario = %self.config.scenario,
            duration = ?total,
            max_vus = self.config.policy.max_vus(),
            "run started"
        );

        let mut interval = tokio::time::interval(CONTROLLER_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_progress = started + PROGRESS_INTERVAL;
        let mut tick_id = 0u64;

        loop {
            interval.tick().await;
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(started);
            if schedule.is_done(elapsed) || gate.is_stopped() {
                break;
            }

            table.reap();
            table.adjust(schedule.target_at(elapsed));

            if now >= next_progress {
                next_progress += PROGRESS_INTERVAL;
                tick_id += 1;
                if let Some(progress) = &self.progress {
                    let stage = match &self.config.policy {
                        SchedulePolicy::Staged { .. } => {
                            schedule.stage_snapshot_at(elapsed).map(|s| StageProgress {
                                stage: s.index + 1,
                                stages: s.count,
                                stage_elapsed: s.stage_elapsed,
                                stage_remaining: s.stage_remaining,
                            })
                        }
                        SchedulePolicy::Fixed { .. } => None,
                    };
                    progress(ProgressUpdate {
                        tick: tick_id,
                        scenario: self.config.scenario.clone(),
                        elapsed,
                        total,
                        active_vus: table.live(),
                        target_vus: schedule.target_at(elapsed),
                        iterations: counters.iterations.load(Ordering::Relaxed),
                        requests: counters.requests.load(Ordering::Relaxed),
                        failed_requests: counters.failed.load(Ordering::Relaxed),
                        stage,
                    });
                }
            }
        }

        gate.stop();
        let aborted = table.drain(self.config.grace_period).await;
        let elapsed = started.elapsed();

        let result = RunResult {
            elapsed,
            peak_vus: table.peak,
            spawned_vus: table.spawned,
            iterations: counters.iterations.load(Ordering::Relaxed),
            aborted_workers: aborted,
        };
        tracing::info!(
            scenario = %self.config.scenario,
            elapsed = ?result.elapsed,
            iterations = result.iterations,
            peak_vus = result.peak_vus,
            aborted_workers = result.aborted_workers,
            "run finished"
        );
        Ok(result)
    }
}

struct WorkerTable<F: WorkerFactory> {
    workers: BTreeMap<u64, WorkerHandle>,
    factory: Arc<F>,
    gate: Arc<RunGate>,
    start: Arc<StartSignal>,
    counters: Arc<RunCounters>,
    pool_size: usize,
    spawned: u64,
    peak: u64,
}

impl<F: WorkerFactory> WorkerTable<F> {
    fn running(&self) -> u64 {
        self.workers
            .values()
            .filter(|w| w.slot.state() == WorkerState::Running && !w.task.is_finished())
            .count() as u64
    }

    fn live(&self) -> u64 {
        self.workers.values().filter(|w| w.is_live()).count() as u64
    }

    /// Drops finished workers so their ids can be reused.
    fn reap(&mut self) {
        self.workers.retain(|_, w| !w.task.is_finished());
    }

    fn adjust(&mut self, target: u64) {
        let running = self.running();

        if running < target {
            let mut need = target - running;

            let retiring: Vec<u64> = self
                .workers
                .iter()
                .filter(|(_, w)| w.slot.state() == WorkerState::Retiring)
                .map(|(id, _)| *id)
                .collect();
            for id in retiring {
                if need == 0 {
                    break;
                }
                if self.workers.get(&id).is_some_and(|w| w.slot.revive()) {
                    tracing::debug!(vu = id, "worker revived");
                    need -= 1;
                }
            }

            while need > 0 {
                let id = self.lowest_free_id();
                self.spawn(id);
                need -= 1;
            }
        } else if running > target {
            let excess = running - target;
            let victims: Vec<u64> = self
                .workers
                .iter()
                .rev()
                .filter(|(_, w)| w.slot.state() == WorkerState::Running)
                .map(|(id, _)| *id)
                .take(excess as usize)
                .collect();
            for id in victims {
                if self.workers.get(&id).is_some_and(|w| w.slot.retire()) {
                    tracing::debug!(vu = id, "worker retiring");
                }
            }
        }

        self.peak = self.peak.max(self.live());
    }

    fn lowest_free_id(&self) -> u64 {
        let mut id = 1;
        for taken in self.workers.keys() {
            if *taken != id {
                break;
            }
            id += 1;
        }
        id
    }

    fn spawn(&mut self, id: u64) {
        let vu = VirtualUser::new(id, self.pool_size);
        let slot = Arc::new(WorkerSlot::new());
        let mut worker = self.factory.worker(vu);
        let gate = self.gate.clone();
        let start = self.start.clone();
        let counters = self.counters.clone();
        let task_slot = slot.clone();

        let task = tokio::spawn(async move {
            start.wait().await;
            let mut iteration = 0u64;
            while !task_slot.should_exit() && gate.is_open() {
                let report = worker.iteration(iteration).await;
                iteration += 1;
                counters.iterations.fetch_add(1, Ordering::Relaxed);
                counters
                    .requests
                    .fetch_add(report.requests, Ordering::Relaxed);
                counters.failed.fetch_add(report.failed, Ordering::Relaxed);
            }
            task_slot.mark_exited();
        });

        tracing::debug!(vu = id, credential = vu.credential_index, "worker spawned");
        self.spawned += 1;
        self.workers.insert(id, WorkerHandle { slot, task });
    }

    /// Waits for every worker up to `grace`, then aborts the rest. Returns the abort count.
    async fn drain(&mut self, grace: Duration) -> u64 {
        let deadline = Instant::now() + grace;
        let mut aborted = 0;

        for (id, handle) in std::mem::take(&mut self.workers) {
            let WorkerHandle { mut task, .. } = handle;
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!(vu = id, error = %e, "worker panicked");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    task.abort();
                    aborted += 1;
                    tracing::warn!(vu = id, ?grace, "worker aborted after grace period");
                }
            }
        }
        aborted
    }
}
