//! Domain models for Schedule Master
//!
//! Contains the scheduling logic without any I/O concerns.

mod calendar;
mod cascade;
mod error;
mod graph;
mod hold;
mod id;
mod lock;
mod resolver;
mod rollover;
mod task;
mod template;

pub use calendar::{parse_weekday, WeekdaySet, WorkingCalendar};
pub use cascade::{
    plan_move, plan_move_pinned, CascadePlan, MoveDirection, PlanEntry, PlanSummary,
};
pub use error::{Result, ScheduleError};
pub use graph::{Dependency, TaskGraph};
pub use hold::{HoldReason, HoldReasonUpdate, HoldRegistry, NewHoldReason, DEFAULT_COLOR};
pub use id::{HoldReasonId, IdError, ProjectId, TaskId, TemplateRowId};
pub use lock::{LockTransition, LockType, TaskEdit, TransitionError};
pub use resolver::{commit, resolve_move, CommitReport, MoveOutcome};
pub use rollover::{sweep, RolloverReport};
pub use task::{HoldChange, NewTask, Task, TaskStatus, TaskUpdate};
pub use template::{TemplateLibrary, TemplateRow};
