//! CLI-style task table
//!
//! Renders the `tasks` readout: one line per enabled task with rate,
//! max/avg execution time, the load each contributes and total time, then
//! check-function and overall load lines. Lines are built in fixed-size
//! `heapless` strings so this works without an allocator.

use core::fmt::{self, Write};

use crate::scheduler::Scheduler;
use crate::task::TaskInfo;
use crate::timer::Clock;

/// Capacity of one rendered line
pub const REPORT_LINE_LEN: usize = 96;

/// One rendered table line
pub type ReportLine = heapless::String<REPORT_LINE_LEN>;

/// Load a task contributes, derived from its latest cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLoad {
    /// Observed execution rate
    pub rate_hz: u32,
    /// Worst-case share of CPU, tenths of a percent
    pub max_load_permille: u32,
    /// Average share of CPU, tenths of a percent
    pub avg_load_permille: u32,
}

pub fn task_load(info: &TaskInfo) -> TaskLoad {
    let rate_hz = match info.latest_delta_time_us {
        0 => 0,
        delta => 1_000_000 / delta,
    };
    // µs busy per second, scaled to tenths of a percent
    let permille = |us: u32| (us as u64 * rate_hz as u64 / 1000).min(u32::MAX as u64) as u32;
    TaskLoad {
        rate_hz,
        max_load_permille: permille(info.max_execution_time_us),
        avg_load_permille: permille(info.average_execution_time_us),
    }
}

/// Render one task line
pub fn format_task_line(info: &TaskInfo) -> Result<ReportLine, fmt::Error> {
    let load = task_load(info);
    let mut line = ReportLine::new();
    write!(
        line,
        "{:2} - {:<10} {:6} {:7} {:7} {:4}.{}% {:4}.{}% {:9}",
        info.id.index(),
        info.name,
        load.rate_hz,
        info.max_execution_time_us,
        info.average_execution_time_us,
        load.max_load_permille / 10,
        load.max_load_permille % 10,
        load.avg_load_permille / 10,
        load.avg_load_permille % 10,
        info.total_execution_time_us / 1000,
    )?;
    Ok(line)
}

/// Write the full table for every enabled task
pub fn write_task_table<W: Write, C: Clock>(
    out: &mut W,
    scheduler: &Scheduler<'_, C>,
) -> fmt::Result {
    writeln!(
        out,
        "Task list       rate/hz  max/us  avg/us maxload avgload  total/ms"
    )?;

    let mut max_total = 0u32;
    let mut avg_total = 0u32;
    for info in scheduler.task_infos().iter().filter(|info| info.is_enabled) {
        let load = task_load(info);
        max_total = max_total.saturating_add(load.max_load_permille);
        avg_total = avg_total.saturating_add(load.avg_load_permille);
        writeln!(out, "{}", format_task_line(info)?)?;
    }

    let checks = scheduler.get_check_func_info();
    writeln!(
        out,
        "Check functions        {:7} {:7}                 {:9}",
        checks.max_execution_time_us,
        checks.average_execution_time_us,
        checks.total_execution_time_us / 1000,
    )?;
    writeln!(
        out,
        "Total                                  {:4}.{}% {:4}.{}%",
        max_total / 10,
        max_total % 10,
        avg_total / 10,
        avg_total % 10,
    )?;
    writeln!(
        out,
        "CPU load {}%, average {}%{}",
        scheduler.cpu_load(),
        scheduler.average_system_load_percent(),
        if scheduler.is_system_overloaded() { " (overloaded)" } else { "" },
    )
}
