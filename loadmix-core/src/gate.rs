use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Run-wide start time, deadline and stop flag.
///
/// Workers consult [`RunGate::is_open`] at the top of every iteration; once the deadline passes
/// or [`RunGate::stop`] is called no new iteration starts, while the current one drains.
#[derive(Debug)]
pub struct RunGate {
    duration: Duration,
    started: OnceLock<Instant>,
    stopped: AtomicBool,
    notify: Notify,
}

impl RunGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: OnceLock::new(),
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Sets t0. Later calls keep the first value.
    pub fn start_at(&self, started: Instant) -> Instant {
        *self.started.get_or_init(|| started)
    }

    pub fn start(&self) -> Instant {
        self.start_at(Instant::now())
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started.get().copied()
    }

    /// `None` before the start, or when the duration reaches past what `Instant` can hold.
    pub fn deadline(&self) -> Option<Instant> {
        self.started_at().and_then(|s| s.checked_add(self.duration))
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at()
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        if self.is_stopped() {
            return false;
        }
        match self.deadline() {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }

    /// Resolves once [`RunGate::stop`] has been called.
    pub async fn stopped(&self) {
        while !self.is_stopped() {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn closes_at_deadline() {
        let gate = RunGate::new(Duration::from_secs(2));
        let t0 = gate.start();
        assert!(gate.is_open());

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(gate.is_open());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!gate.is_open());
        assert_eq!(gate.deadline(), Some(t0 + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_deadline_leaves_the_gate_open_until_stopped() {
        let gate = RunGate::new(Duration::MAX);
        gate.start();
        assert_eq!(gate.deadline(), None);
        assert!(gate.is_open());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(gate.is_open());
        gate.stop();
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn stop_wakes_waiters() {
        let gate = std::sync::Arc::new(RunGate::new(Duration::from_secs(60)));
        gate.start();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.stopped().await })
        };
        gate.stop();
        waiter.await.unwrap_or_else(|e| panic!("{e}"));
        assert!(!gate.is_open());
    }
}
