use std::time::Duration;

pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub scenario: String,
    pub elapsed: Duration,
    pub total: Duration,
    pub active_vus: u64,
    pub target_vus: u64,
    pub iterations: u64,
    pub requests: u64,
    /// Failed requests so far, success per the response contract.
    pub failed_requests: u64,
    pub stage: Option<StageProgress>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.total.as_secs_f64()).clamp(0.0, 1.0)
    }
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
