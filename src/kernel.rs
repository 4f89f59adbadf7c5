//! Kernel: the flight-controller main loop
//!
//! Pairs a [`Scheduler`] with a [`SysTimer`] and paces ticks at a fixed
//! loop interval. A tick whose work runs past the interval is not padded,
//! so overruns stretch the loop the way they would on hardware. Used for
//! host-side simulation and tests.

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::scheduler::{Scheduler, TickReport};
use crate::task::{EventRoutine, TaskId, TaskParams, TaskRoutine};
use crate::timer::{elapsed, Clock, SysTimer, TimeUs};

/// Main loop over a software timer
pub struct Kernel<'a> {
    /// Task scheduler
    pub scheduler: Scheduler<'a, &'a SysTimer>,
    timer: &'a SysTimer,
    /// Ticks driven by this kernel
    pub total_ticks: u64,
}

impl<'a> Kernel<'a> {
    pub fn new(timer: &'a SysTimer, config: SchedulerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(timer, config),
            timer,
            total_ticks: 0,
        }
    }

    /// Bind a routine and enable it straight away
    pub fn add_task(
        &mut self,
        id: TaskId,
        routine: &'a mut dyn TaskRoutine,
        params: TaskParams,
    ) -> Result<()> {
        self.scheduler.bind_with(id, routine, params)?;
        self.scheduler.set_task_enabled(id, true)
    }

    /// Bind an event-driven routine and enable it straight away
    pub fn add_event_task(
        &mut self,
        id: TaskId,
        routine: &'a mut dyn EventRoutine,
        params: TaskParams,
    ) -> Result<()> {
        self.scheduler.bind_event_with(id, routine, params)?;
        self.scheduler.set_task_enabled(id, true)
    }

    /// Run one tick, then wait out the rest of the loop interval
    pub fn step(&mut self, loop_us: TimeUs) -> TickReport {
        let start = self.timer.now_us();
        let report = self.scheduler.tick();
        self.total_ticks += 1;

        let spent = elapsed(self.timer.now_us(), start);
        if spent < loop_us {
            self.timer.advance(loop_us - spent);
        }
        report
    }

    /// Run the loop for `total_us` of simulated time
    pub fn run_for(&mut self, total_us: TimeUs, loop_us: TimeUs) -> LoopStats {
        let begin = self.timer.now_us();
        let mut stats = LoopStats::default();
        while elapsed(self.timer.now_us(), begin) < total_us {
            let report = self.step(loop_us);
            stats.account(&report, self.scheduler.cpu_load());
        }
        self.finish(stats, begin)
    }

    /// Run exactly `ticks` iterations of the loop
    pub fn run_ticks(&mut self, ticks: u32, loop_us: TimeUs) -> LoopStats {
        let begin = self.timer.now_us();
        let mut stats = LoopStats::default();
        for _ in 0..ticks {
            let report = self.step(loop_us);
            stats.account(&report, self.scheduler.cpu_load());
        }
        self.finish(stats, begin)
    }

    fn finish(&self, mut stats: LoopStats, begin: TimeUs) -> LoopStats {
        stats.total_us = elapsed(self.timer.now_us(), begin);
        stats.average_load = self.scheduler.average_system_load_percent();
        stats.overloaded = self.scheduler.is_system_overloaded();
        log_debug!(
            "loop: {} ticks, {} bodies, peak load {}%",
            stats.ticks,
            stats.tasks_executed,
            stats.peak_cpu_load
        );
        stats
    }

    pub fn timer(&self) -> &SysTimer {
        self.timer
    }
}

/// Summary of one [`Kernel::run_for`] / [`Kernel::run_ticks`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Simulated time covered
    pub total_us: TimeUs,
    pub ticks: u32,
    /// Task bodies run, system task included
    pub tasks_executed: u32,
    pub system_runs: u32,
    pub idle_runs: u32,
    /// Highest single-tick load seen
    pub peak_cpu_load: u16,
    /// Smoothed load when the run ended
    pub average_load: u16,
    /// Overload state when the run ended
    pub overloaded: bool,
}

impl LoopStats {
    fn account(&mut self, report: &TickReport, cpu_load: u16) {
        self.ticks += 1;
        if report.system_ran {
            self.system_runs += 1;
            self.tasks_executed += 1;
        }
        if report.selected.is_some() {
            self.tasks_executed += 1;
            if report.idle {
                self.idle_runs += 1;
            }
        }
        self.peak_cpu_load = self.peak_cpu_load.max(cpu_load);
    }
}
