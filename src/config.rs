//! Scheduler configuration
//!
//! Task membership is decided at build time by Cargo features; per-task
//! periods and priorities come from [`TaskDefaults`](crate::task::TaskDefaults)
//! and can be overridden when a routine is bound. What remains here is the
//! global timing budget.

use crate::timer::TimeUs;

/// Default nominal tick budget: one 1 kHz gyro loop
pub const DEFAULT_TICK_BUDGET_US: TimeUs = 1000;

/// Global scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerConfig {
    /// Nominal time budget of one main-loop tick. Load percentages are
    /// measured against it, so work beyond it reads as > 100 %.
    #[cfg_attr(feature = "serde", serde(default = "default_tick_budget"))]
    pub tick_budget_us: TimeUs,
}

#[cfg(feature = "serde")]
fn default_tick_budget() -> TimeUs {
    DEFAULT_TICK_BUDGET_US
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            tick_budget_us: DEFAULT_TICK_BUDGET_US,
        }
    }

    /// Budget derived from a loop rate in Hz (clamped to at least 1 µs)
    pub const fn with_loop_rate_hz(hz: u32) -> Self {
        let budget = if hz == 0 { DEFAULT_TICK_BUDGET_US } else { 1_000_000 / hz };
        Self {
            tick_budget_us: if budget == 0 { 1 } else { budget },
        }
    }

    pub const fn with_tick_budget_us(mut self, us: TimeUs) -> Self {
        self.tick_budget_us = if us == 0 { 1 } else { us };
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(SchedulerConfig::default().tick_budget_us, 1000);
    }

    #[test]
    fn test_loop_rate() {
        assert_eq!(SchedulerConfig::with_loop_rate_hz(500).tick_budget_us, 2000);
        assert_eq!(SchedulerConfig::with_loop_rate_hz(8000).tick_budget_us, 125);
        assert_eq!(SchedulerConfig::with_loop_rate_hz(0).tick_budget_us, 1000);
        assert_eq!(SchedulerConfig::with_loop_rate_hz(2_000_000).tick_budget_us, 1);
    }

    #[test]
    fn test_zero_budget_clamped() {
        assert_eq!(SchedulerConfig::new().with_tick_budget_us(0).tick_budget_us, 1);
    }
}
