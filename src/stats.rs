//! Execution-time accounting
//!
//! Per-task and check-function timing: a moving window over the last
//! [`TASK_MOVING_SUM_COUNT`] samples, a running maximum and a running total
//! since boot. Integer arithmetic only, no allocation.

use crate::timer::TimeUs;

/// Depth of the moving execution-time window
pub const TASK_MOVING_SUM_COUNT: usize = 32;

/// Execution-time statistics for one tracked unit (a task, or all check functions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Last `TASK_MOVING_SUM_COUNT` samples, oldest overwritten first
    samples: [TimeUs; TASK_MOVING_SUM_COUNT],
    /// Next slot to write
    head: usize,
    /// Samples currently held (saturates at the window depth)
    held: usize,
    /// Sum of the held samples
    moving_sum: u64,
    /// Maximum since boot
    max: TimeUs,
    /// Total since boot
    total: u64,
    /// Samples recorded since boot
    count: u32,
}

impl ExecutionStats {
    pub const fn new() -> Self {
        Self {
            samples: [0; TASK_MOVING_SUM_COUNT],
            head: 0,
            held: 0,
            moving_sum: 0,
            max: 0,
            total: 0,
            count: 0,
        }
    }

    /// Record one measured duration
    pub fn record(&mut self, duration: TimeUs) {
        if self.held == TASK_MOVING_SUM_COUNT {
            self.moving_sum -= self.samples[self.head] as u64;
        } else {
            self.held += 1;
        }
        self.samples[self.head] = duration;
        self.head = (self.head + 1) % TASK_MOVING_SUM_COUNT;
        self.moving_sum += duration as u64;

        self.max = self.max.max(duration);
        self.total = self.total.saturating_add(duration as u64);
        self.count = self.count.saturating_add(1);
    }

    /// Average over the samples in the moving window (0 before the first sample)
    pub fn average(&self) -> TimeUs {
        if self.held == 0 {
            0
        } else {
            (self.moving_sum / self.held as u64) as TimeUs
        }
    }

    /// Sum of the samples in the moving window
    pub fn moving_sum(&self) -> u64 {
        self.moving_sum
    }

    pub fn max(&self) -> TimeUs {
        self.max
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate timing of all check-function evaluations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CheckFuncInfo {
    pub max_execution_time_us: TimeUs,
    pub total_execution_time_us: u64,
    pub average_execution_time_us: TimeUs,
    /// Check functions evaluated since boot
    pub evaluation_count: u32,
}

impl From<&ExecutionStats> for CheckFuncInfo {
    fn from(stats: &ExecutionStats) -> Self {
        Self {
            max_execution_time_us: stats.max(),
            total_execution_time_us: stats.total(),
            average_execution_time_us: stats.average(),
            evaluation_count: stats.count(),
        }
    }
}
