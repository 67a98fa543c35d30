use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Notify;

/// One simulated client identity. The credential index is fixed for the worker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualUser {
    pub id: u64,
    pub credential_index: usize,
}

impl VirtualUser {
    /// `id` is 1-based. `pool_size` of zero maps everyone to index 0; the driver rejects an
    /// empty credential pool before any worker exists.
    #[must_use]
    pub fn new(id: u64, pool_size: usize) -> Self {
        let credential_index = if pool_size == 0 {
            0
        } else {
            (id.saturating_sub(1) % pool_size as u64) as usize
        };
        Self {
            id,
            credential_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    /// Finishes the current iteration, then exits unless revived.
    Retiring = 1,
    Exited = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Retiring,
            _ => Self::Exited,
        }
    }
}

/// Lifecycle cell shared between a worker task and the scheduler.
#[derive(Debug)]
pub struct WorkerSlot {
    state: AtomicU8,
}

impl Default for WorkerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSlot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Running as u8),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Running -> Retiring. Returns false if the worker was not running.
    pub fn retire(&self) -> bool {
        self.transition(WorkerState::Running, WorkerState::Retiring)
    }

    /// Retiring -> Running. Fails once the worker has observed the retirement and exited.
    pub fn revive(&self) -> bool {
        self.transition(WorkerState::Retiring, WorkerState::Running)
    }

    /// Called by the worker at the top of its loop. Returns true when it should exit.
    pub fn should_exit(&self) -> bool {
        match self.state() {
            WorkerState::Running => false,
            WorkerState::Exited => true,
            WorkerState::Retiring => {
                self.transition(WorkerState::Retiring, WorkerState::Exited)
                    || self.state() == WorkerState::Exited
            }
        }
    }

    pub fn mark_exited(&self) {
        self.state
            .store(WorkerState::Exited as u8, Ordering::Release);
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        while !self.is_started() {
            let notified = self.notify.notified();
            if self.is_started() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for StartSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_index_wraps_around_pool() {
        let idx: Vec<usize> = (1..=5)
            .map(|id| VirtualUser::new(id, 2).credential_index)
            .collect();
        assert_eq!(idx, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn retired_worker_can_be_revived_until_it_exits() {
        let slot = WorkerSlot::new();
        assert!(slot.retire());
        assert!(!slot.retire());
        assert!(slot.revive());
        assert!(!slot.should_exit());

        assert!(slot.retire());
        assert!(slot.should_exit());
        assert!(!slot.revive());
        assert_eq!(slot.state(), WorkerState::Exited);
    }
}
