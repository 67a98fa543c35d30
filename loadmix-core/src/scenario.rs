use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::catalog::FileCatalog;
use crate::contract::DEFAULT_HEALTH_LATENCY_BOUND;
use crate::debug_log::DebugLog;
use crate::error::{ConfigError, Result};
use crate::executor::{RequestExecutor, Transport, TransportSession, as_millis};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::mix::{MixSelector, WorkloadMix};
use crate::progress::ProgressFn;
use crate::schedule::SchedulePolicy;
use crate::scheduler::{IterationReport, Scheduler, SchedulerConfig, Worker, WorkerFactory};
use crate::thresholds::{ThresholdCondition, ThresholdSet, Verdict, evaluate, parse_thresholds};
use crate::vu::VirtualUser;
use crate::workload::GeneratorContext;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A named mix, scheduling policy and threshold set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDefinition {
    pub name: String,
    pub description: String,
    pub policy: SchedulePolicy,
    pub mix: WorkloadMix,
    pub thresholds: Vec<ThresholdSet>,
}

impl ScenarioDefinition {
    /// Replaces the policy with a fixed one built from whichever of `vus`/`duration` is given,
    /// taking the rest from the current policy.
    #[must_use]
    pub fn with_overrides(mut self, vus: Option<u64>, duration: Option<Duration>) -> Self {
        if vus.is_none() && duration.is_none() {
            return self;
        }
        self.policy = SchedulePolicy::Fixed {
            vus: vus.unwrap_or_else(|| self.policy.max_vus()),
            duration: duration.unwrap_or_else(|| self.policy.total_duration()),
        };
        self
    }
}

/// Scenarios by name. Registering a name twice is an error, never a silent replacement.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: Vec<ScenarioDefinition>,
}

impl ScenarioRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scenario: ScenarioDefinition) -> Result<(), ConfigError> {
        if self.scenarios.iter().any(|s| s.name == scenario.name) {
            return Err(ConfigError::DuplicateScenario(scenario.name));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ScenarioDefinition, ConfigError> {
        self.scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownScenario(name.to_string()))
    }

    /// Scenarios in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ScenarioDefinition> {
        self.scenarios.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub credentials: Vec<String>,
    pub models: Vec<String>,
    pub catalog: FileCatalog,
    pub request_timeout: Duration,
    /// Defaults to `request_timeout`.
    pub grace_period: Option<Duration>,
    pub health_latency_bound: Duration,
    /// Random when absent; the seed in use is reported either way.
    pub seed: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            catalog: FileCatalog::standard(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            grace_period: None,
            health_latency_bound: DEFAULT_HEALTH_LATENCY_BOUND,
            seed: None,
        }
    }
}

impl RunSettings {
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period.unwrap_or(self.request_timeout)
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: String,
    pub seed: u64,
    pub started_at: SystemTime,
    pub elapsed: Duration,
    pub peak_vus: u64,
    pub iterations: u64,
    pub aborted_workers: u64,
    pub metrics: MetricsSnapshot,
    pub verdict: Verdict,
}

/// Everything a scenario needs that was checked before any worker exists.
#[derive(Debug)]
struct PreparedRun {
    selector: MixSelector,
    conditions: Vec<ThresholdCondition>,
    scheduler_config: SchedulerConfig,
}

/// Composition root for one run: owns the metric sink and the VU pool until the report is built.
pub struct ScenarioDriver<T: Transport> {
    scenario: ScenarioDefinition,
    settings: RunSettings,
    transport: Arc<T>,
    debug_log: DebugLog,
    progress: Option<ProgressFn>,
}

impl<T: Transport> ScenarioDriver<T> {
    pub fn new(scenario: ScenarioDefinition, settings: RunSettings, transport: Arc<T>) -> Self {
        Self {
            scenario,
            settings,
            transport,
            debug_log: DebugLog::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_debug_log(mut self, debug_log: DebugLog) -> Self {
        self.debug_log = debug_log;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Option<ProgressFn>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every configuration check the run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prepare().map(|_| ())
    }

    fn prepare(&self) -> Result<PreparedRun, ConfigError> {
        let settings = &self.settings;
        if settings.credentials.is_empty() {
            return Err(ConfigError::EmptyCredentials);
        }
        if self.scenario.mix.has_chat() && settings.models.is_empty() {
            return Err(ConfigError::EmptyModels);
        }

        let scheduler_config = SchedulerConfig {
            scenario: self.scenario.name.clone(),
            policy: self.scenario.policy.clone(),
            grace_period: settings.grace_period(),
            credential_pool_size: settings.credentials.len(),
        };
        scheduler_config.validate()?;

        let conditions = parse_thresholds(&self.scenario.thresholds)?;
        let ctx = GeneratorContext {
            catalog: settings.catalog.clone(),
            models: Arc::from(settings.models.clone()),
        };
        let selector = MixSelector::new(self.scenario.mix.clone(), ctx)?;

        Ok(PreparedRun {
            selector,
            conditions,
            scheduler_config,
        })
    }

    pub async fn run(self) -> Result<RunReport> {
        let prepared = self.prepare()?;
        let seed = self.settings.seed.unwrap_or_else(rand::random);

        let registry = MetricsRegistry::default();
        let executor = RequestExecutor::new(
            &registry,
            self.debug_log.clone(),
            self.settings.health_latency_bound,
        )?;
        let scheduler = Scheduler::new(prepared.scheduler_config)?.with_progress(self.progress);

        self.debug_log.record(format!(
            "scenario {} starting with seed {seed}, policy {:?}",
            self.scenario.name, self.scenario.policy
        ));

        let factory = Arc::new(MixWorkerFactory {
            selector: prepared.selector,
            executor,
            transport: self.transport,
            seed,
        });

        let started_at = SystemTime::now();
        let result = scheduler.run(factory).await?;

        let metrics = registry.snapshot();
        let verdict = evaluate(&prepared.conditions, &metrics);
        for v in &verdict.violations {
            tracing::warn!(
                metric = %v.condition.metric,
                threshold = %v.condition,
                observed = ?v.observed,
                "threshold crossed"
            );
        }

        Ok(RunReport {
            scenario: self.scenario.name,
            seed,
            started_at,
            elapsed: result.elapsed,
            peak_vus: result.peak_vus,
            iterations: result.iterations,
            aborted_workers: result.aborted_workers,
            metrics,
            verdict,
        })
    }
}

/// Derives a per-VU seed so every worker draws an independent, reproducible stream.
#[must_use]
pub fn worker_seed(run_seed: u64, vu_id: u64) -> u64 {
    run_seed ^ vu_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

struct MixWorkerFactory<T: Transport> {
    selector: MixSelector,
    executor: RequestExecutor,
    transport: Arc<T>,
    seed: u64,
}

impl<T: Transport> WorkerFactory for MixWorkerFactory<T> {
    type Worker = MixWorker<T::Session>;

    fn worker(&self, vu: VirtualUser) -> Self::Worker {
        MixWorker {
            session: self.transport.session(&vu),
            vu,
            selector: self.selector.clone(),
            executor: self.executor.clone(),
            rng: StdRng::seed_from_u64(worker_seed(self.seed, vu.id)),
        }
    }
}

struct MixWorker<S> {
    vu: VirtualUser,
    session: S,
    selector: MixSelector,
    executor: RequestExecutor,
    rng: StdRng,
}

impl<S: TransportSession> Worker for MixWorker<S> {
    async fn iteration(&mut self, iteration: u64) -> IterationReport {
        let started = tokio::time::Instant::now();
        let Some(action) = self.selector.next(&self.vu, iteration, &mut self.rng) else {
            // Only reachable if the catalog lost a validated file; avoid spinning.
            tracing::error!(vu = self.vu.id, iteration, "mix produced no action");
            tokio::time::sleep(Duration::from_secs(1)).await;
            return IterationReport::default();
        };

        let outcome = match self
            .executor
            .execute(&mut self.session, &self.vu, &action)
            .await
        {
            Ok(outcome) => outcome,
            Err(failed) => failed.outcome,
        };

        let metrics = self.executor.metrics();
        metrics.iterations.add(1.0);
        metrics
            .iteration_duration
            .add(as_millis(started.elapsed()));

        IterationReport {
            requests: 1,
            failed: u64::from(!outcome.success),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FilePick;
    use crate::workload::{DelayRange, WorkloadGenerator};

    fn scenario(name: &str) -> ScenarioDefinition {
        ScenarioDefinition {
            name: name.to_string(),
            description: String::new(),
            policy: SchedulePolicy::Fixed {
                vus: 1,
                duration: Duration::from_secs(1),
            },
            mix: WorkloadMix::single(WorkloadGenerator::upload(
                "small",
                FilePick::Named("very-small-10KB.txt".to_string()),
                DelayRange::none(),
            )),
            thresholds: Vec::new(),
        }
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = ScenarioRegistry::new();
        registry
            .register(scenario("basic"))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            registry.register(scenario("basic")),
            Err(ConfigError::DuplicateScenario("basic".to_string()))
        );
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get("other"),
            Err(ConfigError::UnknownScenario(_))
        ));
    }

    #[test]
    fn overrides_turn_any_policy_into_fixed() {
        let staged = ScenarioDefinition {
            policy: SchedulePolicy::Staged {
                stages: vec![
                    crate::schedule::RampStage::new(Duration::from_secs(10), 2),
                    crate::schedule::RampStage::new(Duration::from_secs(20), 8),
                ],
            },
            ..scenario("ramp")
        };

        let only_vus = staged.clone().with_overrides(Some(3), None);
        assert_eq!(
            only_vus.policy,
            SchedulePolicy::Fixed {
                vus: 3,
                duration: Duration::from_secs(30)
            }
        );

        let only_duration = staged
            .clone()
            .with_overrides(None, Some(Duration::from_secs(5)));
        assert_eq!(
            only_duration.policy,
            SchedulePolicy::Fixed {
                vus: 8,
                duration: Duration::from_secs(5)
            }
        );

        assert_eq!(staged.clone().with_overrides(None, None), staged);
    }

    #[test]
    fn worker_seeds_differ_per_vu() {
        assert_ne!(worker_seed(7, 1), worker_seed(7, 2));
        assert_eq!(worker_seed(7, 3), worker_seed(7, 3));
    }
}
