//! flight-sched: cooperative task scheduler for flight-control main loops
//!
//! One main loop, many periodic and event-driven tasks, no preemption:
//! - Static task table keyed by a closed [`TaskId`] set (no heap)
//! - Dynamic-priority aging so low-weight tasks are never starved
//! - Per-task execution-time statistics over a 32-sample moving window
//! - CPU load measured against the nominal tick budget, with an
//!   overload signal for load shedding
//!
//! ```
//! use flight_sched::{Scheduler, SchedulerConfig, SysTimer, TaskContext, TaskId, TimeUs};
//!
//! let timer = SysTimer::software();
//! let mut serial = |_now: TimeUs, _ctx: &mut TaskContext| {};
//! let mut sched = Scheduler::new(&timer, SchedulerConfig::default());
//! sched.bind(TaskId::Serial, &mut serial).unwrap();
//! sched.set_task_enabled(TaskId::Serial, true).unwrap();
//!
//! timer.set(10_000);
//! assert_eq!(sched.tick().selected, Some(TaskId::Serial));
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod logging;

pub mod config;
pub mod error;
pub mod kernel;
pub mod load;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod task;
pub mod timer;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use kernel::{Kernel, LoopStats};
pub use load::LoadMonitor;
pub use scheduler::{Scheduler, TickReport};
pub use stats::{CheckFuncInfo, ExecutionStats};
pub use task::{
    EventRoutine, TaskContext, TaskId, TaskInfo, TaskParams, TaskPriority, TaskRoutine, TASK_COUNT,
};
pub use timer::{Clock, SysTimer, TimeUs};
