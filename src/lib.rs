//! Schedule Master - construction schedule planner
//!
//! Tasks are linked by finish-to-start dependencies and scheduled on a
//! working-day calendar. Moving a task cascades to every successor that
//! would otherwise overlap, while confirmed and in-progress work is locked
//! and only moves with explicit confirmation. A daily rollover sweep pushes
//! overdue tasks forward to today.

pub mod cli;
pub mod domain;
pub mod engine;
pub mod storage;

pub use domain::{ProjectId, ScheduleError, Task, TaskGraph, TaskId, TaskStatus};
pub use engine::ScheduleEngine;
