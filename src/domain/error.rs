//! Error taxonomy for scheduling operations
//!
//! Every engine operation returns one of these as a typed result. A failed
//! operation leaves the project graph exactly as it was.

use thiserror::Error;

use super::id::{HoldReasonId, IdError, ProjectId, TaskId, TemplateRowId};
use super::lock::LockType;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task {task} is locked ({lock})")]
    TaskLocked { task: TaskId, lock: LockType },

    #[error("Adding dependency would create a cycle: {task} -> {predecessor}")]
    CycleDetected { task: TaskId, predecessor: TaskId },

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(TaskId),

    #[error("Cascade plan for task {0} is stale; re-plan and retry")]
    StaleCascade(TaskId),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Hold reason not found: {0}")]
    HoldReasonNotFound(HoldReasonId),

    #[error("Hold reason {0} is inactive")]
    HoldReasonInactive(HoldReasonId),

    #[error("Invalid transition for task {task}: {reason}")]
    InvalidTransition { task: TaskId, reason: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Project already exists: {0}")]
    ProjectExists(ProjectId),

    #[error("Template row not found: {0}")]
    TemplateRowNotFound(TemplateRowId),

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ScheduleError {
    /// Returns true if the caller should re-plan and retry
    ///
    /// Only a stale cascade is expected under concurrency; everything else is
    /// a caller error and is never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::StaleCascade(_))
    }

    /// Short machine-readable kind, used in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::TaskNotFound(_) => "task_not_found",
            ScheduleError::TaskLocked { .. } => "task_locked",
            ScheduleError::CycleDetected { .. } => "cycle_detected",
            ScheduleError::SelfDependency(_) => "self_dependency",
            ScheduleError::StaleCascade(_) => "stale_cascade",
            ScheduleError::InvalidDate(_) => "invalid_date",
            ScheduleError::HoldReasonNotFound(_) => "hold_reason_not_found",
            ScheduleError::HoldReasonInactive(_) => "hold_reason_inactive",
            ScheduleError::InvalidTransition { .. } => "invalid_transition",
            ScheduleError::ProjectNotFound(_) => "project_not_found",
            ScheduleError::ProjectExists(_) => "project_exists",
            ScheduleError::TemplateRowNotFound(_) => "template_row_not_found",
            ScheduleError::InvalidId(_) => "invalid_id",
            ScheduleError::Storage(_) => "storage",
        }
    }
}

pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;
