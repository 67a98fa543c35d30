#![forbid(unsafe_code)]

mod catalog;
mod chat;
mod contract;
mod debug_log;
mod error;
mod executor;
mod gate;
mod mix;
mod progress;
mod schedule;
mod scenario;
mod scheduler;
mod thresholds;
mod vu;
mod workload;

pub mod metrics;

pub use catalog::{CatalogFile, ContentKind, FileCatalog, FilePick};
pub use chat::{ChatFileRef, ChatMessage, ChatRequest, ChatShape};
pub use contract::{Contract, ContractCheck, DEFAULT_HEALTH_LATENCY_BOUND, estimate_tokens};
pub use debug_log::{DEFAULT_DEBUG_LOG_CAPACITY, DebugLog};
pub use error::{
    ConfigError, Error, PROTOCOL_BODY_EXCERPT, ProtocolError, Result, TransportError,
    TransportErrorKind,
};
pub use executor::{
    ExecuteError, FailedRequest, RawResponse, RequestExecutor, RequestOutcome, StandardMetrics,
    Transport, TransportSession,
};
pub use gate::RunGate;
pub use metrics::{MetricKind, MetricValues, MetricsRegistry, MetricsSnapshot, TrendSnapshot};
pub use mix::{Action, MixSelector, Partition, WeightedEntry, WorkloadMix};
pub use progress::{PROGRESS_INTERVAL, ProgressFn, ProgressUpdate, StageProgress};
pub use scenario::{
    DEFAULT_REQUEST_TIMEOUT, RunReport, RunSettings, ScenarioDefinition, ScenarioDriver,
    ScenarioRegistry, worker_seed,
};
pub use schedule::{RampSchedule, RampStage, SchedulePolicy};
pub use scheduler::{
    DEFAULT_GRACE_PERIOD, IterationReport, RunResult, Scheduler, SchedulerConfig, Worker,
    WorkerFactory,
};
pub use thresholds::{
    Comparator, Statistic, ThresholdCondition, ThresholdSet, ThresholdViolation, Verdict,
    evaluate, parse_thresholds,
};
pub use vu::{VirtualUser, WorkerSlot, WorkerState};
pub use workload::{
    DelayRange, GeneratorContext, Operation, Payload, WorkloadGenerator, WorkloadItem,
};
