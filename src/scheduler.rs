//! Cooperative dynamic-priority scheduler
//!
//! One task body per tick, run to completion. Each tick:
//!
//! 1. the system task runs first whenever its period has elapsed (it closes
//!    the load accounting window and must never be starved);
//! 2. every enabled, aging task that is due grows its dynamic priority by
//!    `weight × age_periods`, where `age_periods = 1 + overdue / period`;
//! 3. the highest dynamic priority wins, ties going to the lowest `TaskId`;
//! 4. with no winner, no system run and no overload, one due idle-class
//!    task gets the tick, round-robin.
//!
//! A waiting task's score grows every tick, and faster the further it falls
//! behind its own period, so it eventually outbids any task that keeps
//! getting reset to zero by running.
//!
//! Static task table, no dynamic allocation.

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::load::LoadMonitor;
use crate::stats::{CheckFuncInfo, ExecutionStats};
use crate::task::{
    EventRoutine, Task, TaskBody, TaskContext, TaskId, TaskInfo, TaskParams, TaskRoutine,
    TASK_COUNT,
};
use crate::timer::{elapsed, Clock, TimeUs};

/// Outcome of one [`Scheduler::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    /// Timestamp the tick was scheduled against
    pub now: TimeUs,
    /// Time since the previous tick
    pub delta_us: TimeUs,
    /// The system task ran ahead of contention
    pub system_ran: bool,
    /// Non-system task that ran (contention winner or idle task)
    pub selected: Option<TaskId>,
    /// `selected` came from the idle class
    pub idle: bool,
    /// Aging tasks that were due this tick
    pub waiting_tasks: u16,
    /// Time spent in task bodies and check functions
    pub busy_us: TimeUs,
}

/// Task table plus the selection loop
///
/// `'a` is the lifetime of the firmware's task routines, `C` the clock.
pub struct Scheduler<'a, C: Clock> {
    clock: C,
    config: SchedulerConfig,
    /// Static task table, indexed by `TaskId`
    tasks: [Task<'a>; TASK_COUNT],
    /// Aggregate check-function timing
    check_funcs: ExecutionStats,
    load: LoadMonitor,
    /// Task selected on the current/last tick
    current_task: Option<TaskId>,
    /// Next idle-class slot to consider
    idle_cursor: usize,
    last_tick_at: TimeUs,
    tick_delta: TimeUs,
    ticks: u64,
}

impl<'a, C: Clock> Scheduler<'a, C> {
    /// Build the task table: system task enabled, everything else unbound
    pub fn new(clock: C, config: SchedulerConfig) -> Self {
        let now = clock.now_us();
        let tasks = core::array::from_fn(|i| Task::new(TaskId::ALL[i], now));
        log_info!(
            "scheduler init: {} task kinds, tick budget {} us",
            TASK_COUNT,
            config.tick_budget_us
        );
        Self {
            clock,
            config,
            tasks,
            check_funcs: ExecutionStats::new(),
            load: LoadMonitor::new(config.tick_budget_us),
            current_task: None,
            idle_cursor: 0,
            last_tick_at: now,
            tick_delta: 0,
            ticks: 0,
        }
    }

    /// Attach a routine with the task kind's default period and priority
    pub fn bind(&mut self, id: TaskId, routine: &'a mut dyn TaskRoutine) -> Result<()> {
        self.bind_with(id, routine, id.defaults().into())
    }

    /// Attach a periodic routine with explicit period and priority
    ///
    /// Only allowed before the first tick. The task stays disabled until
    /// [`set_task_enabled`](Self::set_task_enabled).
    pub fn bind_with(
        &mut self,
        id: TaskId,
        routine: &'a mut dyn TaskRoutine,
        params: TaskParams,
    ) -> Result<()> {
        self.attach(id, TaskBody::Routine(routine), params)
    }

    /// Attach an event-driven routine with the task kind's defaults
    pub fn bind_event(&mut self, id: TaskId, routine: &'a mut dyn EventRoutine) -> Result<()> {
        self.bind_event_with(id, routine, id.defaults().into())
    }

    /// Attach an event-driven routine with explicit period and priority
    ///
    /// The period only scales aging once the check has fired.
    pub fn bind_event_with(
        &mut self,
        id: TaskId,
        routine: &'a mut dyn EventRoutine,
        params: TaskParams,
    ) -> Result<()> {
        self.attach(id, TaskBody::Event(routine), params)
    }

    fn attach(&mut self, id: TaskId, body: TaskBody<'a>, params: TaskParams) -> Result<()> {
        if self.ticks > 0 {
            return Err(SchedulerError::AlreadyStarted);
        }
        if !id.is_real() {
            return Err(SchedulerError::InvalidTask(id));
        }
        if id == TaskId::System {
            return Err(SchedulerError::SystemTaskRequired);
        }
        let task = &mut self.tasks[id.index()];
        if task.is_bound() {
            return Err(SchedulerError::AlreadyBound(id));
        }
        task.body = body;
        task.desired_period_us = params.desired_period_us;
        task.static_priority = params.priority;
        log_debug!(
            "bound {}: period {} us, weight {}",
            id.name(),
            params.desired_period_us,
            params.priority.weight()
        );
        Ok(())
    }

    /// Enable or disable a task
    ///
    /// Disabling drops accrued dynamic priority (and any pending signal).
    /// Re-enabling restarts aging from the current time, so time spent
    /// disabled never counts as overdue.
    pub fn set_task_enabled(&mut self, id: TaskId, enabled: bool) -> Result<()> {
        let idx = self.resolve(id)?;
        let now = self.clock.now_us();
        let task = &mut self.tasks[idx];
        if enabled {
            if !task.is_bound() {
                return Err(SchedulerError::TaskNotBound(task.id));
            }
            if !task.is_enabled {
                log_debug!("enable {}", task.name);
                task.restart_aging(now);
            }
            task.is_enabled = true;
        } else {
            if task.id == TaskId::System {
                return Err(SchedulerError::SystemTaskRequired);
            }
            if task.is_enabled {
                log_debug!("disable {}", task.name);
            }
            task.is_enabled = false;
            task.clear_aging();
        }
        Ok(())
    }

    /// Change a task's desired period; statistics and timestamps are untouched
    pub fn reschedule_task(&mut self, id: TaskId, new_period_us: TimeUs) -> Result<()> {
        let idx = self.resolve(id)?;
        let task = &mut self.tasks[idx];
        task.desired_period_us = new_period_us;
        log_debug!("reschedule {}: period {} us", task.name, new_period_us);
        Ok(())
    }

    /// Snapshot of one task
    pub fn get_task_info(&self, id: TaskId) -> Result<TaskInfo> {
        let idx = self.resolve(id)?;
        Ok(self.tasks[idx].info())
    }

    /// Time between the task's two most recent executions
    pub fn get_task_delta_time(&self, id: TaskId) -> Result<TimeUs> {
        let idx = self.resolve(id)?;
        Ok(self.tasks[idx].task_latest_delta_time)
    }

    /// Aggregate check-function timing
    pub fn get_check_func_info(&self) -> CheckFuncInfo {
        CheckFuncInfo::from(&self.check_funcs)
    }

    /// Snapshots of every task, in table order
    pub fn task_infos(&self) -> [TaskInfo; TASK_COUNT] {
        core::array::from_fn(|i| self.tasks[i].info())
    }

    pub fn cpu_load(&self) -> u16 {
        self.load.cpu_load()
    }

    pub fn average_system_load_percent(&self) -> u16 {
        self.load.average_system_load_percent()
    }

    pub fn is_system_overloaded(&self) -> bool {
        self.load.is_system_overloaded()
    }

    /// Task selected on the current or most recent tick
    pub fn current_task(&self) -> Option<TaskId> {
        self.current_task
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Time between the two most recent ticks
    pub fn tick_delta(&self) -> TimeUs {
        self.tick_delta
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one scheduling step
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now_us();
        self.tick_delta = elapsed(now, self.last_tick_at);
        self.last_tick_at = now;
        self.ticks = self.ticks.wrapping_add(1);
        self.current_task = None;

        let mut busy: TimeUs = 0;

        // System guard: housekeeping is never left to contention
        let system_ran = {
            let sys = &self.tasks[TaskId::System.index()];
            elapsed(now, sys.last_executed_at) >= sys.desired_period_us
        };
        if system_ran {
            busy = busy.saturating_add(self.execute(TaskId::System.index(), now));
        }

        // Age due tasks and pick the winner
        let mut selected: Option<usize> = None;
        let mut selected_priority = 0u32;
        let mut waiting_tasks = 0u16;
        for idx in 1..TASK_COUNT {
            let task = &mut self.tasks[idx];
            if !task.is_enabled || !task.is_bound() {
                continue;
            }
            task.task_age_cycles = task.task_age_cycles.saturating_add(1);
            if !task.static_priority.ages() {
                continue;
            }

            let (due, check_time) = update_due(&self.clock, task, &mut self.check_funcs, now);
            busy = busy.saturating_add(check_time);
            if !due {
                continue;
            }
            waiting_tasks = waiting_tasks.saturating_add(1);
            // Strict comparison keeps the lowest id on ties
            if task.dynamic_priority > selected_priority {
                selected_priority = task.dynamic_priority;
                selected = Some(idx);
            }
        }

        let mut idle = false;
        if selected.is_none() && !system_ran && !self.load.is_system_overloaded() {
            let (pick, check_time) = self.select_idle(now);
            busy = busy.saturating_add(check_time);
            selected = pick;
            idle = pick.is_some();
        }

        if let Some(idx) = selected {
            log_trace!("run {} at {} (priority {})", self.tasks[idx].name, now, selected_priority);
            busy = busy.saturating_add(self.execute(idx, now));
        }

        let worked = system_ran || selected.is_some();
        self.load.record_tick(busy, worked);

        TickReport {
            now,
            delta_us: self.tick_delta,
            system_ran,
            selected: selected.map(|idx| self.tasks[idx].id),
            idle,
            waiting_tasks,
            busy_us: busy,
        }
    }

    /// Round-robin over due idle-class tasks; returns the pick and check time
    fn select_idle(&mut self, now: TimeUs) -> (Option<usize>, TimeUs) {
        let mut check_time: TimeUs = 0;
        for step in 0..TASK_COUNT {
            let idx = (self.idle_cursor + step) % TASK_COUNT;
            let task = &mut self.tasks[idx];
            if idx == TaskId::System.index()
                || !task.is_enabled
                || !task.is_bound()
                || task.static_priority.ages()
            {
                continue;
            }
            let (due, spent) = update_due(&self.clock, task, &mut self.check_funcs, now);
            check_time = check_time.saturating_add(spent);
            if due {
                self.idle_cursor = (idx + 1) % TASK_COUNT;
                return (Some(idx), check_time);
            }
        }
        (None, check_time)
    }

    /// Run the task in slot `idx`; returns its execution time
    fn execute(&mut self, idx: usize, now: TimeUs) -> TimeUs {
        let task = &mut self.tasks[idx];
        task.task_latest_delta_time = elapsed(now, task.last_executed_at);
        task.last_executed_at = now;
        task.age_reference = now;
        task.dynamic_priority = 0;
        task.task_age_cycles = 0;
        self.current_task = Some(task.id);

        let start = self.clock.now_us();
        let mut ctx = TaskContext::new(start, task.task_latest_delta_time);
        match &mut task.body {
            TaskBody::System => {
                self.load.roll_window();
            }
            TaskBody::Routine(routine) => routine.run(start, &mut ctx),
            TaskBody::Event(routine) => routine.run(start, &mut ctx),
            TaskBody::Unbound => {}
        }
        let duration = elapsed(self.clock.now_us(), start);
        task.stats.record(duration);

        if let Some(period) = ctx.requested_period() {
            task.desired_period_us = period;
        }
        if ctx.disable_requested() && task.id != TaskId::System {
            task.is_enabled = false;
            task.clear_aging();
        }
        duration
    }

    /// Map an id (including `SelfTask`) to a table index
    fn resolve(&self, id: TaskId) -> Result<usize> {
        match id {
            TaskId::SelfTask => self
                .current_task
                .map(TaskId::index)
                .ok_or(SchedulerError::NoCurrentTask),
            TaskId::None => Err(SchedulerError::InvalidTask(id)),
            real => Ok(real.index()),
        }
    }
}

/// Decide whether `task` is due, aging it if it is
///
/// Returns `(due, time spent in the check function)`. Idle-class tasks pass
/// through without gaining dynamic priority.
fn update_due<C: Clock>(
    clock: &C,
    task: &mut Task<'_>,
    check_funcs: &mut ExecutionStats,
    now: TimeUs,
) -> (bool, TimeUs) {
    let period = task.desired_period_us;
    let mut check_time = 0;

    let overdue = if task.is_event_driven() {
        if task.is_pending() {
            elapsed(now, task.last_signaled_at)
        } else {
            let before = clock.now_us();
            let delta = elapsed(before, task.last_executed_at);
            let signaled = match &mut task.body {
                TaskBody::Event(routine) => routine.check(before, delta),
                _ => false,
            };
            check_time = elapsed(clock.now_us(), before);
            check_funcs.record(check_time);
            if !signaled {
                return (false, check_time);
            }
            task.last_signaled_at = before;
            0
        }
    } else {
        let since = elapsed(now, task.age_reference);
        if since < period {
            return (false, 0);
        }
        since - period
    };

    if task.static_priority.ages() {
        let age_periods = if period == 0 { 1 } else { 1 + overdue / period };
        let step = task.static_priority.weight().saturating_mul(age_periods);
        task.dynamic_priority = task.dynamic_priority.saturating_add(step);
    }
    (true, check_time)
}
