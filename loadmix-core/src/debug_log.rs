use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

pub const DEFAULT_DEBUG_LOG_CAPACITY: usize = 1000;

/// Bounded in-memory debug trail shared by the components of one run.
///
/// Every record is also forwarded to `tracing` at debug level, so the handle is a
/// retention layer on top of the regular log stream rather than a replacement for it.
/// Once `capacity` entries are retained, the oldest entry is dropped for each new one.
#[derive(Debug, Clone)]
pub struct DebugLog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    entries: Mutex<VecDeque<String>>,
    dropped: AtomicU64,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEFAULT_DEBUG_LOG_CAPACITY)
    }
}

impl DebugLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// A handle that only forwards to `tracing` and retains nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn record(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "loadmix::debug", "{message}");

        if self.inner.capacity == 0 {
            return;
        }

        let line = format!("[{}] {message}", unix_millis());
        let mut entries = self.inner.entries.lock();
        if entries.len() == self.inner.capacity {
            entries.pop_front();
            self.inner
                .dropped
                .fetch_add(1, Ordering::Relaxed);
        }
        entries.push_back(line);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.inner.entries.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries evicted because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner
            .dropped
            .load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn render(&self) -> String {
        let entries = self.inner.entries.lock();
        let mut out = String::new();
        for line in entries.iter() {
            writeln!(&mut out, "{line}").ok();
        }
        out
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_is_bounded_and_keeps_newest() {
        let log = DebugLog::new(3);
        for i in 0..5 {
            log.record(format!("entry {i}"));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].ends_with("entry 2"));
        assert!(entries[2].ends_with("entry 4"));
        assert_eq!(log.dropped(), 2);
    }

    #[test]
    fn disabled_log_retains_nothing() {
        let log = DebugLog::disabled();
        log.record("ignored");
        assert!(log.is_empty());
        assert_eq!(log.dropped(), 0);
    }

    #[test]
    fn clones_share_the_same_buffer() {
        let log = DebugLog::new(8);
        let other = log.clone();
        other.record("from clone");
        assert_eq!(log.len(), 1);
        assert!(log.render().contains("from clone"));
    }
}
