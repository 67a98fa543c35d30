use std::time::Duration;

use crate::error::ConfigError;

/// One window of a staged ramp: reach `target_vus` by the end of `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStage {
    pub duration: Duration,
    pub target_vus: u64,
}

impl RampStage {
    #[must_use]
    pub const fn new(duration: Duration, target_vus: u64) -> Self {
        Self {
            duration,
            target_vus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulePolicy {
    Fixed { vus: u64, duration: Duration },
    Staged { stages: Vec<RampStage> },
}

impl SchedulePolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Fixed { vus, duration } => {
                if *vus == 0 {
                    return Err(ConfigError::InvalidVus);
                }
                if duration.is_zero() {
                    return Err(ConfigError::InvalidDuration);
                }
            }
            Self::Staged { stages } => {
                if stages.is_empty() {
                    return Err(ConfigError::InvalidStages);
                }
                if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
                    return Err(ConfigError::ZeroStageDuration { index });
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Fixed { duration, .. } => *duration,
            Self::Staged { stages } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
        }
    }

    /// Highest number of VUs the policy can ask for at once.
    #[must_use]
    pub fn max_vus(&self) -> u64 {
        match self {
            Self::Fixed { vus, .. } => *vus,
            Self::Staged { stages } => stages.iter().map(|s| s.target_vus).max().unwrap_or(0),
        }
    }

    #[must_use]
    pub fn schedule(&self) -> RampSchedule {
        match self {
            Self::Fixed { vus, duration } => RampSchedule::constant(*vus, *duration),
            Self::Staged { stages } => RampSchedule::new(0, stages.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub current_target: u64,
}

/// Target VU count over time. Interpolates linearly inside each stage, rounding down.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start: u64,
    stages: Vec<RampStage>,
    cumulative_ends: Vec<Duration>,
    constant: bool,
}

impl RampSchedule {
    pub fn new(start: u64, stages: Vec<RampStage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            cumulative_ends,
            constant: false,
        }
    }

    /// `vus` from t0 until `duration`.
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self {
            constant: true,
            ..Self::new(vus, vec![RampStage::new(duration, vus)])
        }
    }

    pub fn stages(&self) -> &[RampStage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if self.stages.is_empty() {
            return self.start;
        }
        if self.constant {
            return self.start;
        }
        if elapsed.is_zero() {
            return self.start;
        }

        if elapsed >= self.total_duration() {
            return self.stages.last().map_or(self.start, |s| s.target_vus);
        }

        let idx = self.stage_index(elapsed);
        let (stage_start, stage_end) = self.bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = self.start_target(idx);
        let end_target = self.stages[idx].target_vus;
        if stage_duration.is_zero() {
            return end_target;
        }

        let start_i = i128::from(start_target);
        let delta = i128::from(end_target) - start_i;
        let num = stage_elapsed.as_nanos() as i128;
        let den = (stage_duration.as_nanos() as i128).max(1);

        // Floor, also for ramp-down: a partially retired VU still counts.
        let cur = start_i + (delta.saturating_mul(num)).div_euclid(den);
        cur.clamp(0, i128::from(u64::MAX)) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let idx = if self.is_done(clamped) {
            self.stages.len().saturating_sub(1)
        } else {
            self.stage_index(clamped)
        };
        let (stage_start, stage_end) = self.bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            current_target: self.target_at(clamped),
        })
    }

    fn stage_index(&self, elapsed: Duration) -> usize {
        // An elapsed time equal to a boundary belongs to the stage that ends there.
        match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) | Err(i) => i.min(self.stages.len().saturating_sub(1)),
        }
    }

    fn bounds(&self, idx: usize) -> (Duration, Duration) {
        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        (start, self.cumulative_ends[idx])
    }

    fn start_target(&self, idx: usize) -> u64 {
        if idx == 0 {
            self.start
        } else {
            self.stages[idx - 1].target_vus
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp() -> RampSchedule {
        RampSchedule::new(
            0,
            vec![
                RampStage::new(secs(10), 2),
                RampStage::new(secs(20), 5),
                RampStage::new(secs(10), 0),
            ],
        )
    }

    #[test]
    fn interpolates_within_stages() {
        let s = ramp();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(5)), 1);
        assert_eq!(s.target_at(secs(10)), 2);
        assert_eq!(s.target_at(secs(20)), 3);
        assert_eq!(s.target_at(secs(25)), 4);
        assert_eq!(s.target_at(secs(30)), 5);
        assert_eq!(s.target_at(secs(35)), 2);
        assert_eq!(s.target_at(secs(40)), 0);
        assert!(s.is_done(secs(40)));
        assert_eq!(s.total_duration(), secs(40));
    }

    #[test]
    fn constant_schedule_holds_from_t0() {
        let s = RampSchedule::constant(5, secs(60));
        assert_eq!(s.target_at(Duration::ZERO), 5);
        assert_eq!(s.target_at(secs(59)), 5);
        assert_eq!(s.total_duration(), secs(60));
    }

    #[test]
    fn stage_snapshot_tracks_current_stage() {
        let snap = ramp()
            .stage_snapshot_at(secs(15))
            .unwrap_or_else(|| panic!("expected a snapshot"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 3);
        assert_eq!(snap.stage_elapsed, secs(5));
        assert_eq!(snap.stage_remaining, secs(15));
    }

    #[test]
    fn policy_validation() {
        assert_eq!(
            SchedulePolicy::Fixed {
                vus: 0,
                duration: secs(1)
            }
            .validate(),
            Err(ConfigError::InvalidVus)
        );
        assert_eq!(
            SchedulePolicy::Staged { stages: vec![] }.validate(),
            Err(ConfigError::InvalidStages)
        );
        assert_eq!(
            SchedulePolicy::Staged {
                stages: vec![RampStage::new(secs(1), 1), RampStage::new(Duration::ZERO, 2)]
            }
            .validate(),
            Err(ConfigError::ZeroStageDuration { index: 1 })
        );
        assert_eq!(
            SchedulePolicy::Staged {
                stages: vec![RampStage::new(secs(1), 3), RampStage::new(secs(1), 7)]
            }
            .max_vus(),
            7
        );
    }
}
