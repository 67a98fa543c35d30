use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

/// Concurrent metric sink. Writers only touch the aggregate behind their handle; the
/// name map is consulted when a handle is first resolved and when taking snapshots.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: DashMap<Arc<str>, MetricEntry>,
}

#[derive(Debug, Clone)]
enum MetricEntry {
    Counter(Arc<CounterAgg>),
    Rate(Arc<RateAgg>),
    Trend(Arc<TrendAgg>),
}

impl MetricEntry {
    fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::default()),
            MetricKind::Rate => Self::Rate(Arc::default()),
            MetricKind::Trend => Self::Trend(Arc::default()),
        }
    }
}

impl MetricsRegistry {
    pub fn counter(&self, name: &str) -> Result<Counter, ConfigError> {
        match self.resolve(name, MetricKind::Counter)? {
            MetricEntry::Counter(agg) => Ok(Counter(agg)),
            other => Err(mismatch(name, other.kind())),
        }
    }

    pub fn rate(&self, name: &str) -> Result<Rate, ConfigError> {
        match self.resolve(name, MetricKind::Rate)? {
            MetricEntry::Rate(agg) => Ok(Rate(agg)),
            other => Err(mismatch(name, other.kind())),
        }
    }

    pub fn trend(&self, name: &str) -> Result<Trend, ConfigError> {
        match self.resolve(name, MetricKind::Trend)? {
            MetricEntry::Trend(agg) => Ok(Trend(agg)),
            other => Err(mismatch(name, other.kind())),
        }
    }

    fn resolve(&self, name: &str, kind: MetricKind) -> Result<MetricEntry, ConfigError> {
        if let Some(existing) = self.metrics.get(name) {
            if existing.kind() != kind {
                return Err(mismatch(name, existing.kind()));
            }
            return Ok(existing.clone());
        }

        match self.metrics.entry(Arc::from(name)) {
            Entry::Occupied(e) => {
                let existing = e.get();
                if existing.kind() != kind {
                    return Err(mismatch(name, existing.kind()));
                }
                Ok(existing.clone())
            }
            Entry::Vacant(e) => Ok(e.insert(MetricEntry::new(kind)).clone()),
        }
    }

    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.metrics.get(name).map(|e| e.kind())
    }

    /// Point-in-time copy of every metric. Reading never mutates the live aggregates.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut metrics = BTreeMap::new();
        for entry in self.metrics.iter() {
            let values = match entry.value() {
                MetricEntry::Counter(c) => MetricValues::Counter { value: c.get() },
                MetricEntry::Rate(r) => r.summarize(),
                MetricEntry::Trend(t) => MetricValues::Trend(t.summarize()),
            };
            metrics.insert(entry.key().to_string(), values);
        }
        MetricsSnapshot { metrics }
    }
}

fn mismatch(name: &str, existing: MetricKind) -> ConfigError {
    ConfigError::MetricKindMismatch {
        name: name.to_string(),
        existing: existing.to_string(),
    }
}

/// Monotonic sum. Negative and non-finite additions are ignored.
#[derive(Debug, Clone)]
pub struct Counter(Arc<CounterAgg>);

impl Counter {
    pub fn add(&self, value: f64) {
        self.0.add(value);
    }

    #[must_use]
    pub fn get(&self) -> f64 {
        self.0.get()
    }
}

#[derive(Debug, Clone)]
pub struct Rate(Arc<RateAgg>);

impl Rate {
    pub fn add(&self, value: bool) {
        self.0.add(value);
    }
}

#[derive(Debug, Clone)]
pub struct Trend(Arc<TrendAgg>);

impl Trend {
    pub fn add(&self, value: f64) {
        self.0.record(value);
    }
}

#[derive(Debug, Default)]
struct CounterAgg {
    value: Mutex<f64>,
}

impl CounterAgg {
    fn add(&self, v: f64) {
        if !v.is_finite() || v < 0.0 {
            return;
        }
        *self.value.lock() += v;
    }

    fn get(&self) -> f64 {
        *self.value.lock()
    }
}

#[derive(Debug, Default)]
struct RateAgg {
    total: AtomicU64,
    trues: AtomicU64,
}

impl RateAgg {
    fn add(&self, v: bool) {
        // `trues` first so a concurrent reader never observes trues > total.
        if v {
            self.trues.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn summarize(&self) -> MetricValues {
        let trues = self.trues.load(Ordering::Relaxed);
        MetricValues::rate(trues, self.total.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
struct TrendAgg {
    samples: Mutex<Vec<f64>>,
}

impl TrendAgg {
    fn record(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.samples.lock().push(value);
    }

    fn summarize(&self) -> TrendSnapshot {
        let mut sorted = self.samples.lock().clone();
        sorted.sort_by(f64::total_cmp);
        TrendSnapshot::from_sorted(sorted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    metrics: BTreeMap<String, MetricValues>,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricValues> {
        self.metrics.get(name)
    }

    /// Metrics ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValues)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: MetricValues) {
        self.metrics.insert(name.into(), values);
    }
}

impl<S: Into<String>> FromIterator<(S, MetricValues)> for MetricsSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, MetricValues)>>(iter: I) -> Self {
        Self {
            metrics: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MetricValues {
    Counter {
        value: f64,
    },
    Rate {
        total: u64,
        trues: u64,
        rate: Option<f64>,
    },
    Trend(TrendSnapshot),
}

impl MetricValues {
    /// Rate values with the ratio derived from the counts.
    #[must_use]
    pub fn rate(trues: u64, total: u64) -> Self {
        let total = total.max(trues);
        let rate = (total > 0).then(|| trues as f64 / total as f64);
        Self::Rate { total, trues, rate }
    }

    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter { .. } => MetricKind::Counter,
            Self::Rate { .. } => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }
}

/// Sorted copy of a trend's samples taken at snapshot time.
#[derive(Debug, Clone)]
pub struct TrendSnapshot {
    sorted: Arc<[f64]>,
    sum: f64,
}

impl Default for TrendSnapshot {
    fn default() -> Self {
        Self::from_sorted(Vec::new())
    }
}

impl TrendSnapshot {
    fn from_sorted(sorted: Vec<f64>) -> Self {
        let sum = sorted.iter().sum();
        Self {
            sorted: Arc::from(sorted),
            sum,
        }
    }

    /// Builds a snapshot from samples in any order.
    #[must_use]
    pub fn from_samples(samples: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = samples.into_iter().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        Self::from_sorted(sorted)
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.sorted.len() as u64
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    #[must_use]
    pub fn avg(&self) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }
        Some(self.sum / self.sorted.len() as f64)
    }

    #[must_use]
    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        nearest_rank(&self.sorted, p)
    }
}

/// Nearest-rank percentile over ascending samples: the value at 1-based rank
/// `ceil(p / 100 * n)`, clamped to `[1, n]`.
#[must_use]
pub fn nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !p.is_finite() {
        return None;
    }

    let n = sorted.len();
    let p = p.clamp(0.0, 100.0);
    // `p * n` first keeps integer percentiles exact; the epsilon absorbs representation error
    // for fractional ones (e.g. 99.9).
    let rank = ((p * n as f64) / 100.0 - 1e-9).ceil();
    let rank = (rank.max(1.0) as usize).min(n);
    Some(sorted[rank - 1])
}

/// Names of the metrics every run registers.
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const TIME_TO_FIRST_BYTE: &str = "time_to_first_byte";
    pub const CONNECTION_TIME: &str = "connection_time";
    pub const DATA_SENT: &str = "data_sent";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";

    pub const UPLOAD_DURATION: &str = "upload_duration";
    pub const UPLOADED_BYTES: &str = "uploaded_bytes";
    pub const SUCCESS_RATE: &str = "success_rate";

    pub const CHAT_RESPONSE_TIME: &str = "chat_response_time";
    pub const CHAT_MESSAGES_PROCESSED: &str = "chat_messages_processed";
    pub const CHAT_TOKENS_GENERATED: &str = "chat_tokens_generated";
    pub const CHAT_SUCCESS_RATE: &str = "chat_success_rate";

    pub const CHECKS: &str = "checks";
    pub const HEALTH_CHECK_DURATION: &str = "health_check_duration";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend_of(metrics: &MetricsRegistry, name: &str) -> TrendSnapshot {
        match metrics.snapshot().get(name) {
            Some(MetricValues::Trend(t)) => t.clone(),
            other => panic!("expected trend values, got {other:?}"),
        }
    }

    #[test]
    fn nearest_rank_on_one_to_hundred() {
        let samples: Vec<f64> = (1..=100u32).map(f64::from).collect();
        assert_eq!(nearest_rank(&samples, 50.0), Some(50.0));
        assert_eq!(nearest_rank(&samples, 95.0), Some(95.0));
        assert_eq!(nearest_rank(&samples, 99.0), Some(99.0));
        assert_eq!(nearest_rank(&samples, 100.0), Some(100.0));
        assert_eq!(nearest_rank(&samples, 0.0), Some(1.0));
    }

    #[test]
    fn nearest_rank_boundary_rounds_up() {
        // 10 samples: p(95) => rank ceil(9.5) = 10, p(90) => rank 9, p(7) => rank ceil(0.7) = 1.
        let samples: Vec<f64> = (1..=10u32).map(f64::from).collect();
        assert_eq!(nearest_rank(&samples, 95.0), Some(10.0));
        assert_eq!(nearest_rank(&samples, 90.0), Some(9.0));
        assert_eq!(nearest_rank(&samples, 7.0), Some(1.0));
        assert_eq!(nearest_rank(&samples, 11.0), Some(2.0));
    }

    #[test]
    fn nearest_rank_empty_is_none() {
        assert_eq!(nearest_rank(&[], 50.0), None);
    }

    #[test]
    fn percentile_is_independent_of_insertion_order() {
        let metrics = MetricsRegistry::default();
        let a = metrics.trend("a").unwrap_or_else(|e| panic!("{e}"));
        let b = metrics.trend("b").unwrap_or_else(|e| panic!("{e}"));

        for v in 1..=100u32 {
            a.add(f64::from(v));
            b.add(f64::from(101 - v));
        }

        let ta = trend_of(&metrics, "a");
        let tb = trend_of(&metrics, "b");
        for p in [1.0, 25.0, 50.0, 90.0, 95.0, 99.0] {
            assert_eq!(ta.percentile(p), tb.percentile(p));
        }
    }

    #[test]
    fn percentile_is_monotonic_and_stable_under_requery() {
        let t = TrendSnapshot::from_samples([5.0, 3.0, 9.0, 1.0, 7.0, 7.0, 2.0]);
        let mut last = f64::MIN;
        for p in 0..=100u32 {
            let v = t.percentile(f64::from(p)).unwrap_or_else(|| panic!("empty"));
            assert!(v >= last, "p({p}) = {v} < {last}");
            last = v;
        }
        assert_eq!(t.percentile(50.0), t.percentile(50.0));
        assert_eq!(t.median(), Some(5.0));
    }

    #[test]
    fn trend_summary_stats() {
        let metrics = MetricsRegistry::default();
        let t = metrics.trend("t").unwrap_or_else(|e| panic!("{e}"));
        t.add(f64::NAN);
        t.add(1.0);
        t.add(2.0);
        t.add(0.0);

        let s = trend_of(&metrics, "t");
        assert_eq!(s.count(), 3);
        assert_eq!(s.min(), Some(0.0));
        assert_eq!(s.max(), Some(2.0));
        assert_eq!(s.avg(), Some(1.0));
    }

    #[test]
    fn rate_records_total_and_trues() {
        let metrics = MetricsRegistry::default();
        let r = metrics.rate("r").unwrap_or_else(|e| panic!("{e}"));
        r.add(true);
        r.add(false);
        r.add(true);

        let Some(MetricValues::Rate { total, trues, rate }) = metrics.snapshot().get("r").cloned()
        else {
            panic!("expected rate values");
        };
        assert_eq!(total, 3);
        assert_eq!(trues, 2);
        assert_eq!(rate, Some(2.0 / 3.0));
    }

    #[test]
    fn counter_ignores_negative_values() {
        let metrics = MetricsRegistry::default();
        let c = metrics.counter("c").unwrap_or_else(|e| panic!("{e}"));
        c.add(10.0);
        c.add(-3.0);
        c.add(f64::INFINITY);
        c.add(2.5);
        assert_eq!(c.get(), 12.5);
    }

    #[test]
    fn handles_for_the_same_name_share_state() {
        let metrics = MetricsRegistry::default();
        let a = metrics.counter("bytes").unwrap_or_else(|e| panic!("{e}"));
        let b = metrics.counter("bytes").unwrap_or_else(|e| panic!("{e}"));
        a.add(1.0);
        b.add(2.0);
        assert_eq!(a.get(), 3.0);
    }

    #[test]
    fn kind_mismatch_is_a_config_error() {
        let metrics = MetricsRegistry::default();
        let _ = metrics.rate("success_rate").unwrap_or_else(|e| panic!("{e}"));
        let err = match metrics.trend("success_rate") {
            Ok(_) => panic!("expected kind mismatch"),
            Err(e) => e,
        };
        assert!(matches!(err, ConfigError::MetricKindMismatch { .. }));
    }

    #[test]
    fn concurrent_writers_are_all_counted() {
        let metrics = Arc::new(MetricsRegistry::default());
        let mut threads = Vec::new();
        for _ in 0..8 {
            let metrics = metrics.clone();
            threads.push(std::thread::spawn(move || {
                let t = metrics.trend("lat").unwrap_or_else(|e| panic!("{e}"));
                let r = metrics.rate("ok").unwrap_or_else(|e| panic!("{e}"));
                for i in 0..1000u32 {
                    t.add(f64::from(i));
                    r.add(i % 2 == 0);
                }
            }));
        }
        for t in threads {
            t.join().unwrap_or_else(|_| panic!("writer panicked"));
        }

        let snapshot = metrics.snapshot();
        match snapshot.get("lat") {
            Some(MetricValues::Trend(t)) => assert_eq!(t.count(), 8000),
            other => panic!("unexpected {other:?}"),
        }
        match snapshot.get("ok") {
            Some(MetricValues::Rate { total, trues, .. }) => {
                assert_eq!(*total, 8000);
                assert_eq!(*trues, 4000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
