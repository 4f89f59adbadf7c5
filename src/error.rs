//! Scheduler error type
//!
//! Only configuration-level mistakes surface here. Task bodies have no
//! error channel back into the scheduler, and overload is advisory.

use crate::task::TaskId;

/// Result alias for scheduler API calls
pub type Result<T> = core::result::Result<T, SchedulerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// Sentinel or otherwise unusable task identifier
    #[error("invalid task id: {0}")]
    InvalidTask(TaskId),
    /// `TaskId::SelfTask` used before any task has been selected
    #[error("no task has been selected yet")]
    NoCurrentTask,
    /// Task kind has no routine bound, so it cannot be enabled
    #[error("task {0} has no routine bound")]
    TaskNotBound(TaskId),
    /// A routine is already bound to this task kind
    #[error("task {0} already has a routine bound")]
    AlreadyBound(TaskId),
    /// The system task performs scheduler bookkeeping and cannot be disabled or rebound
    #[error("the system task cannot be disabled or rebound")]
    SystemTaskRequired,
    /// Routines can only be bound before the first tick
    #[error("scheduler already started ticking")]
    AlreadyStarted,
}
