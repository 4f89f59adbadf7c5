//! Task definitions: static, no-alloc task descriptors
//!
//! The set of task kinds is closed and fixed at build time: Cargo features
//! add or remove variants of [`TaskId`], and the discriminants stay dense so
//! the table can be indexed directly. Each kind carries static defaults
//! (name, period, priority); the firmware supplies the body as a
//! [`TaskRoutine`].

use core::fmt;

use crate::stats::ExecutionStats;
use crate::timer::TimeUs;

/// Period in µs for a rate in Hz (rates below 1 Hz clamp to 1 Hz)
pub const fn period_hz(hz: u32) -> TimeUs {
    1_000_000 / if hz == 0 { 1 } else { hz }
}

/// Task identifier
///
/// Real tasks are numbered densely from 0 in firmware order. `None` and
/// `SelfTask` are service ids: "no task" and "the currently running task".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskId {
    System,
    #[cfg(not(feature = "async-gyro"))]
    GyroPid,
    #[cfg(feature = "async-gyro")]
    Pid,
    #[cfg(feature = "async-gyro")]
    Gyro,
    #[cfg(feature = "async-gyro")]
    Acc,
    #[cfg(feature = "async-gyro")]
    Attitude,
    Serial,
    Beeper,
    Battery,
    Rx,
    #[cfg(feature = "gps")]
    Gps,
    #[cfg(feature = "mag")]
    Compass,
    #[cfg(feature = "baro")]
    Baro,
    #[cfg(feature = "pitot")]
    Pitot,
    #[cfg(feature = "opflow")]
    OpticalFlow,
    #[cfg(feature = "sonar")]
    Sonar,
    #[cfg(feature = "dashboard")]
    Dashboard,
    #[cfg(feature = "telemetry")]
    Telemetry,
    #[cfg(feature = "led-strip")]
    LedStrip,
    #[cfg(feature = "pwm-driver")]
    PwmDriver,
    #[cfg(feature = "stack-check")]
    StackCheck,
    #[cfg(feature = "osd")]
    Osd,
    #[cfg(feature = "cms")]
    Cms,

    /// No task
    None,
    /// The task currently (or most recently) selected
    SelfTask,
}

/// Number of real tasks in this build
pub const TASK_COUNT: usize = TaskId::None as usize;

impl TaskId {
    /// Every real task id, in table order
    pub const ALL: [TaskId; TASK_COUNT] = [
        TaskId::System,
        #[cfg(not(feature = "async-gyro"))]
        TaskId::GyroPid,
        #[cfg(feature = "async-gyro")]
        TaskId::Pid,
        #[cfg(feature = "async-gyro")]
        TaskId::Gyro,
        #[cfg(feature = "async-gyro")]
        TaskId::Acc,
        #[cfg(feature = "async-gyro")]
        TaskId::Attitude,
        TaskId::Serial,
        TaskId::Beeper,
        TaskId::Battery,
        TaskId::Rx,
        #[cfg(feature = "gps")]
        TaskId::Gps,
        #[cfg(feature = "mag")]
        TaskId::Compass,
        #[cfg(feature = "baro")]
        TaskId::Baro,
        #[cfg(feature = "pitot")]
        TaskId::Pitot,
        #[cfg(feature = "opflow")]
        TaskId::OpticalFlow,
        #[cfg(feature = "sonar")]
        TaskId::Sonar,
        #[cfg(feature = "dashboard")]
        TaskId::Dashboard,
        #[cfg(feature = "telemetry")]
        TaskId::Telemetry,
        #[cfg(feature = "led-strip")]
        TaskId::LedStrip,
        #[cfg(feature = "pwm-driver")]
        TaskId::PwmDriver,
        #[cfg(feature = "stack-check")]
        TaskId::StackCheck,
        #[cfg(feature = "osd")]
        TaskId::Osd,
        #[cfg(feature = "cms")]
        TaskId::Cms,
    ];

    /// Table index (only meaningful for real tasks)
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Real task id for a table index
    pub fn from_index(idx: usize) -> Option<TaskId> {
        Self::ALL.get(idx).copied()
    }

    /// Is this a real task (not a service id)?
    #[inline]
    pub const fn is_real(self) -> bool {
        (self as usize) < TASK_COUNT
    }

    /// Diagnostic name
    pub const fn name(self) -> &'static str {
        self.defaults().name
    }

    /// Static configuration for this task kind
    pub const fn defaults(self) -> TaskDefaults {
        use TaskPriority::*;
        let (name, period, priority) = match self {
            TaskId::System => ("SYSTEM", period_hz(10), High),
            #[cfg(not(feature = "async-gyro"))]
            TaskId::GyroPid => ("GYRO/PID", 1000, Realtime),
            #[cfg(feature = "async-gyro")]
            TaskId::Pid => ("PID", 1000, Realtime),
            #[cfg(feature = "async-gyro")]
            TaskId::Gyro => ("GYRO", 1000, Realtime),
            #[cfg(feature = "async-gyro")]
            TaskId::Acc => ("ACC", 1000, High),
            #[cfg(feature = "async-gyro")]
            TaskId::Attitude => ("ATTITUDE", period_hz(100), Medium),
            TaskId::Serial => ("SERIAL", period_hz(100), Low),
            TaskId::Beeper => ("BEEPER", period_hz(100), Medium),
            TaskId::Battery => ("BATTERY", period_hz(50), Medium),
            TaskId::Rx => ("RX", period_hz(50), High),
            #[cfg(feature = "gps")]
            TaskId::Gps => ("GPS", period_hz(10), Medium),
            #[cfg(feature = "mag")]
            TaskId::Compass => ("COMPASS", period_hz(10), Low),
            #[cfg(feature = "baro")]
            TaskId::Baro => ("BARO", period_hz(20), Low),
            #[cfg(feature = "pitot")]
            TaskId::Pitot => ("PITOT", period_hz(10), Low),
            #[cfg(feature = "opflow")]
            TaskId::OpticalFlow => ("OPFLOW", period_hz(10), Low),
            #[cfg(feature = "sonar")]
            TaskId::Sonar => ("SONAR", period_hz(20), Low),
            #[cfg(feature = "dashboard")]
            TaskId::Dashboard => ("DASHBOARD", period_hz(10), Low),
            #[cfg(feature = "telemetry")]
            TaskId::Telemetry => ("TELEMETRY", period_hz(250), Idle),
            #[cfg(feature = "led-strip")]
            TaskId::LedStrip => ("LEDSTRIP", period_hz(100), Idle),
            #[cfg(feature = "pwm-driver")]
            TaskId::PwmDriver => ("PWMDRIVER", period_hz(200), Idle),
            #[cfg(feature = "stack-check")]
            TaskId::StackCheck => ("STACKCHECK", period_hz(10), Idle),
            #[cfg(feature = "osd")]
            TaskId::Osd => ("OSD", period_hz(60), Low),
            #[cfg(feature = "cms")]
            TaskId::Cms => ("CMS", period_hz(50), Low),
            TaskId::None => ("NONE", 0, Idle),
            TaskId::SelfTask => ("SELF", 0, Idle),
        };
        TaskDefaults {
            name,
            desired_period_us: period,
            priority,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static task priority
///
/// Ordered from least to most urgent. `Idle` is the one class that never
/// ages: it only gets a tick nobody else wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskPriority {
    /// Runs only on otherwise empty ticks; no dynamic priority
    Idle,
    Low,
    Medium,
    High,
    Realtime,
    Max,
}

impl TaskPriority {
    /// Aging step weight
    pub const fn weight(self) -> u32 {
        match self {
            TaskPriority::Idle => 0,
            TaskPriority::Low => 1,
            TaskPriority::Medium => 3,
            TaskPriority::High => 5,
            TaskPriority::Realtime => 6,
            TaskPriority::Max => 255,
        }
    }

    /// Does this class accrue dynamic priority while waiting?
    pub const fn ages(self) -> bool {
        !matches!(self, TaskPriority::Idle)
    }
}

/// Static defaults for one task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    pub name: &'static str,
    pub desired_period_us: TimeUs,
    pub priority: TaskPriority,
}

/// Per-binding overrides of period and priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskParams {
    pub desired_period_us: TimeUs,
    pub priority: TaskPriority,
}

impl TaskParams {
    pub const fn new(desired_period_us: TimeUs, priority: TaskPriority) -> Self {
        Self {
            desired_period_us,
            priority,
        }
    }

    pub const fn from_hz(hz: u32, priority: TaskPriority) -> Self {
        Self::new(period_hz(hz), priority)
    }
}

impl From<TaskDefaults> for TaskParams {
    fn from(d: TaskDefaults) -> Self {
        Self::new(d.desired_period_us, d.priority)
    }
}

/// Context handed to a running task body
///
/// Bodies cannot reach the scheduler while they run, so requests that
/// target the running task itself are recorded here and applied as soon as
/// the body returns.
#[derive(Debug)]
pub struct TaskContext {
    now: TimeUs,
    delta_time: TimeUs,
    new_period: Option<TimeUs>,
    disable: bool,
}

impl TaskContext {
    pub(crate) fn new(now: TimeUs, delta_time: TimeUs) -> Self {
        Self {
            now,
            delta_time,
            new_period: None,
            disable: false,
        }
    }

    /// Timestamp taken just before the body was invoked
    pub fn now(&self) -> TimeUs {
        self.now
    }

    /// Time since this task's previous execution
    pub fn delta_time(&self) -> TimeUs {
        self.delta_time
    }

    /// Change this task's desired period from the next due check on
    pub fn reschedule(&mut self, period_us: TimeUs) {
        self.new_period = Some(period_us);
    }

    /// Disable this task once the body returns
    pub fn disable(&mut self) {
        self.disable = true;
    }

    pub(crate) fn requested_period(&self) -> Option<TimeUs> {
        self.new_period
    }

    pub(crate) fn disable_requested(&self) -> bool {
        self.disable
    }
}

/// A task body supplied by the firmware
///
/// Bodies must return promptly and handle their own faults.
pub trait TaskRoutine {
    /// Execute one unit of work
    fn run(&mut self, now: TimeUs, ctx: &mut TaskContext);
}

/// A task body gated by a check function instead of its period
///
/// Bound with [`Scheduler::bind_event`](crate::Scheduler::bind_event); having
/// a check is what makes a task event-driven.
pub trait EventRoutine: TaskRoutine {
    /// Has new work arrived? `delta` is the time since the last execution.
    fn check(&mut self, now: TimeUs, delta: TimeUs) -> bool;
}

impl<F> TaskRoutine for F
where
    F: FnMut(TimeUs, &mut TaskContext),
{
    fn run(&mut self, now: TimeUs, ctx: &mut TaskContext) {
        self(now, ctx)
    }
}

/// What executes when a slot is selected
pub(crate) enum TaskBody<'a> {
    /// Scheduler housekeeping (load window rollover)
    System,
    /// Firmware-supplied periodic routine
    Routine(&'a mut dyn TaskRoutine),
    /// Firmware-supplied routine gated by its check function
    Event(&'a mut dyn EventRoutine),
    /// Compiled in, but the firmware did not provide a routine
    Unbound,
}

/// One task table slot: configuration, scheduling state and statistics
pub(crate) struct Task<'a> {
    pub id: TaskId,
    pub name: &'static str,
    pub body: TaskBody<'a>,

    // Configuration
    pub is_enabled: bool,
    pub desired_period_us: TimeUs,
    pub static_priority: TaskPriority,

    // Scheduling
    pub dynamic_priority: u32,
    pub task_age_cycles: u32,
    pub last_executed_at: TimeUs,
    pub last_signaled_at: TimeUs,
    /// Periodic dueness and overdue are measured from here: the last
    /// execution, or the moment the task was last re-enabled
    pub age_reference: TimeUs,
    pub task_latest_delta_time: TimeUs,

    // Statistics
    pub stats: ExecutionStats,
}

impl<'a> Task<'a> {
    pub fn new(id: TaskId, now: TimeUs) -> Self {
        let defaults = id.defaults();
        let body = if id == TaskId::System {
            TaskBody::System
        } else {
            TaskBody::Unbound
        };
        Self {
            id,
            name: defaults.name,
            body,
            is_enabled: id == TaskId::System,
            desired_period_us: defaults.desired_period_us,
            static_priority: defaults.priority,
            dynamic_priority: 0,
            task_age_cycles: 0,
            last_executed_at: now,
            last_signaled_at: now,
            age_reference: now,
            task_latest_delta_time: 0,
            stats: ExecutionStats::new(),
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.body, TaskBody::Unbound)
    }

    pub fn is_event_driven(&self) -> bool {
        matches!(self.body, TaskBody::Event(_))
    }

    /// Event-driven task already signaled but not yet run
    pub fn is_pending(&self) -> bool {
        self.is_event_driven() && self.dynamic_priority > 0
    }

    /// Restart aging from `now`, as if the task had just run
    pub fn restart_aging(&mut self, now: TimeUs) {
        self.clear_aging();
        self.age_reference = now;
        self.last_signaled_at = now;
    }

    /// Drop accrued scheduling state (on disable)
    pub fn clear_aging(&mut self) {
        self.dynamic_priority = 0;
        self.task_age_cycles = 0;
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name,
            is_enabled: self.is_enabled,
            desired_period_us: self.desired_period_us,
            static_priority: self.static_priority,
            dynamic_priority: self.dynamic_priority,
            task_age_cycles: self.task_age_cycles,
            last_executed_at: self.last_executed_at,
            last_signaled_at: self.last_signaled_at,
            max_execution_time_us: self.stats.max(),
            total_execution_time_us: self.stats.total(),
            average_execution_time_us: self.stats.average(),
            latest_delta_time_us: self.task_latest_delta_time,
            execution_count: self.stats.count(),
        }
    }
}

/// Read-only snapshot of one task, for telemetry and CLI readouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: &'static str,
    pub is_enabled: bool,
    pub desired_period_us: TimeUs,
    pub static_priority: TaskPriority,
    pub dynamic_priority: u32,
    pub task_age_cycles: u32,
    pub last_executed_at: TimeUs,
    pub last_signaled_at: TimeUs,
    pub max_execution_time_us: TimeUs,
    pub total_execution_time_us: u64,
    pub average_execution_time_us: TimeUs,
    pub latest_delta_time_us: TimeUs,
    pub execution_count: u32,
}
