//! CPU load monitor
//!
//! Busy time is everything the scheduler spends inside task bodies and
//! check functions. It is measured against the nominal tick budget, so a
//! tick whose work runs past the budget reads above 100 %.
//!
//! Two signals are published:
//! - `cpu_load`: the most recent tick alone (noisy)
//! - `average_system_load_percent`: the last closed accounting window,
//!   averaged over the ticks in it that did work. The system task closes
//!   the window each time it runs.

use crate::timer::TimeUs;

/// Load at or above which the system counts as overloaded
pub const OVERLOAD_THRESHOLD_PERCENT: u16 = 100;

/// Busy-time accounting and derived load percentages
#[derive(Debug, Clone)]
pub struct LoadMonitor {
    /// Nominal time budget of one tick
    tick_budget_us: TimeUs,
    /// Load of the most recent tick
    cpu_load: u16,
    /// Load of the last closed window
    average_system_load_percent: u16,
    /// Busy time accumulated in the open window
    window_busy_us: u64,
    /// Ticks in the open window that did any work
    window_working_ticks: u32,
    /// Windows closed since boot
    windows: u32,
    /// Overload state as of the last closed window
    overloaded: bool,
}

impl LoadMonitor {
    pub const fn new(tick_budget_us: TimeUs) -> Self {
        Self {
            tick_budget_us: if tick_budget_us == 0 { 1 } else { tick_budget_us },
            cpu_load: 0,
            average_system_load_percent: 0,
            window_busy_us: 0,
            window_working_ticks: 0,
            windows: 0,
            overloaded: false,
        }
    }

    /// Account one tick's busy time
    ///
    /// `worked` is true when the tick ran a task body; ticks that only
    /// evaluated check functions count as working if that took any time.
    pub fn record_tick(&mut self, busy_us: TimeUs, worked: bool) {
        self.cpu_load = percent(busy_us as u64, self.tick_budget_us as u64);
        if worked || busy_us > 0 {
            self.window_busy_us = self.window_busy_us.saturating_add(busy_us as u64);
            self.window_working_ticks = self.window_working_ticks.saturating_add(1);
        }
    }

    /// Close the accounting window and publish its average
    pub fn roll_window(&mut self) -> u16 {
        let capacity = self.window_working_ticks as u64 * self.tick_budget_us as u64;
        self.average_system_load_percent = if capacity == 0 {
            0
        } else {
            percent(self.window_busy_us, capacity)
        };
        self.window_busy_us = 0;
        self.window_working_ticks = 0;
        self.windows = self.windows.wrapping_add(1);

        let overloaded = self.is_system_overloaded();
        if overloaded != self.overloaded {
            if overloaded {
                log_warn!("system overloaded: {}% load", self.average_system_load_percent);
            } else {
                log_info!("system load recovered: {}%", self.average_system_load_percent);
            }
            self.overloaded = overloaded;
        }
        self.average_system_load_percent
    }

    /// Load of the most recent tick, percent of the tick budget
    pub fn cpu_load(&self) -> u16 {
        self.cpu_load
    }

    /// Smoothed load, percent of the tick budget
    pub fn average_system_load_percent(&self) -> u16 {
        self.average_system_load_percent
    }

    /// Advisory overload signal for load shedding elsewhere in the firmware
    pub fn is_system_overloaded(&self) -> bool {
        self.average_system_load_percent >= OVERLOAD_THRESHOLD_PERCENT
    }

    pub fn tick_budget_us(&self) -> TimeUs {
        self.tick_budget_us
    }

    /// Accounting windows closed since boot
    pub fn windows(&self) -> u32 {
        self.windows
    }
}

fn percent(part: u64, whole: u64) -> u16 {
    (part.saturating_mul(100) / whole).min(u16::MAX as u64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantaneous_load() {
        let mut m = LoadMonitor::new(1000);
        m.record_tick(250, true);
        assert_eq!(m.cpu_load(), 25);
        m.record_tick(1500, true);
        assert_eq!(m.cpu_load(), 150);
        m.record_tick(0, false);
        assert_eq!(m.cpu_load(), 0);
    }

    #[test]
    fn test_average_only_published_on_roll() {
        let mut m = LoadMonitor::new(1000);
        m.record_tick(1200, true);
        assert_eq!(m.average_system_load_percent(), 0);
        assert_eq!(m.roll_window(), 120);
        assert!(m.is_system_overloaded());
    }

    #[test]
    fn test_idle_spins_do_not_dilute() {
        let mut m = LoadMonitor::new(1000);
        m.record_tick(500, true);
        for _ in 0..100 {
            m.record_tick(0, false);
        }
        m.record_tick(700, true);
        assert_eq!(m.roll_window(), 60);
    }

    #[test]
    fn test_check_only_ticks_count() {
        let mut m = LoadMonitor::new(100);
        m.record_tick(50, false);
        assert_eq!(m.roll_window(), 50);
    }

    #[test]
    fn test_empty_window_reads_zero() {
        let mut m = LoadMonitor::new(1000);
        m.record_tick(2000, true);
        assert_eq!(m.roll_window(), 200);
        assert_eq!(m.roll_window(), 0);
        assert!(!m.is_system_overloaded());
        assert_eq!(m.windows(), 2);
    }

    #[test]
    fn test_saturation() {
        let mut m = LoadMonitor::new(1);
        m.record_tick(u32::MAX, true);
        assert_eq!(m.cpu_load(), u16::MAX);
    }

    #[test]
    fn test_zero_budget_clamped() {
        assert_eq!(LoadMonitor::new(0).tick_budget_us(), 1);
    }
}
