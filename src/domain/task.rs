//! Task domain model
//!
//! A task occupies a span of working days on the project calendar and may
//! depend on other tasks finishing first (finish-to-start). Dates and locks
//! are only changed through the cascade and lock APIs; this module covers
//! the record itself and its non-date edits.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::WorkingCalendar;
use super::error::Result;
use super::id::{HoldReasonId, TaskId, TemplateRowId};
use super::lock::LockType;

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Started,
    Completed,
    OnHold,
}

impl TaskStatus {
    /// Returns true if this status represents completion
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Returns true if this task is not yet started
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::NotStarted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::OnHold => "on_hold",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "not_started" => Ok(TaskStatus::NotStarted),
            "started" => Ok(TaskStatus::Started),
            "completed" => Ok(TaskStatus::Completed),
            "on_hold" => Ok(TaskStatus::OnHold),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// A scheduled task within a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the project
    pub id: TaskId,

    /// Display/order position; not a scheduling input
    pub task_number: u32,

    /// Human-readable name
    pub name: String,

    /// First working day of the task
    pub start_date: NaiveDate,

    /// Last working day of the task (inclusive)
    pub end_date: NaiveDate,

    /// Span in working days, at least 1
    pub duration_days: u32,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Set together with `status == on_hold`
    #[serde(default)]
    pub is_hold_task: bool,

    /// Why the task is held; may outlive the reason it points at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_reason_id: Option<HoldReasonId>,

    /// Status to restore when the hold is released
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_before_hold: Option<TaskStatus>,

    /// Lock classification
    #[serde(default)]
    pub lock_type: LockType,

    /// Tasks that must finish before this one starts
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub predecessor_ids: BTreeSet<TaskId>,

    /// Template row this task was created from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_row_id: Option<TemplateRowId>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task ad hoc or from a template row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub start_date: NaiveDate,
    pub duration_days: u32,
    #[serde(default)]
    pub predecessor_ids: BTreeSet<TaskId>,
    #[serde(default)]
    pub template_row_id: Option<TemplateRowId>,
}

impl NewTask {
    pub fn new(name: impl Into<String>, start_date: NaiveDate, duration_days: u32) -> Self {
        Self {
            name: name.into(),
            start_date,
            duration_days,
            predecessor_ids: BTreeSet::new(),
            template_row_id: None,
        }
    }

    pub fn after(mut self, predecessors: impl IntoIterator<Item = TaskId>) -> Self {
        self.predecessor_ids.extend(predecessors);
        self
    }
}

/// Placing or releasing a hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldChange {
    Place(HoldReasonId),
    Release,
}

/// Non-date field edits; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hold: Option<HoldChange>,
    #[serde(default)]
    pub lock: Option<super::lock::LockTransition>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.hold.is_none() && self.lock.is_none()
    }
}

impl Task {
    /// Creates an unlocked, not-started task with dates derived from the calendar
    pub fn scheduled(
        id: TaskId,
        task_number: u32,
        new: &NewTask,
        calendar: &WorkingCalendar,
    ) -> Result<Self> {
        let duration_days = new.duration_days.max(1);
        let start_date = calendar.next_working_day(new.start_date)?;
        let end_date = calendar.end_date_for(start_date, duration_days)?;
        let now = Utc::now();

        Ok(Self {
            id,
            task_number,
            name: new.name.trim().to_string(),
            start_date,
            end_date,
            duration_days,
            status: TaskStatus::NotStarted,
            is_hold_task: false,
            hold_reason_id: None,
            status_before_hold: None,
            lock_type: LockType::None,
            predecessor_ids: BTreeSet::new(),
            template_row_id: new.template_row_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns true if the task carries any lock
    pub fn is_locked(&self) -> bool {
        self.lock_type.is_locked()
    }

    /// Returns true if the task is on hold
    pub fn is_on_hold(&self) -> bool {
        self.is_hold_task && self.status == TaskStatus::OnHold
    }

    /// Updates the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Renames the task
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into().trim().to_string();
        self.touch();
    }

    /// Writes a new date span; callers go through the cascade commit
    pub(crate) fn set_dates(&mut self, start_date: NaiveDate, end_date: NaiveDate) {
        self.start_date = start_date;
        self.end_date = end_date;
        self.touch();
    }

    /// Writes a new lock/status pair; callers go through the lock state machine
    pub(crate) fn set_lock(&mut self, lock_type: LockType, status: TaskStatus) {
        self.lock_type = lock_type;
        self.status = status;
        self.touch();
    }

    /// Puts the task on hold; dates and lock are untouched
    pub fn place_on_hold(&mut self, reason: HoldReasonId) {
        if !self.is_on_hold() {
            self.status_before_hold = Some(self.status);
        }
        self.is_hold_task = true;
        self.status = TaskStatus::OnHold;
        self.hold_reason_id = Some(reason);
        self.touch();
    }

    /// Releases a hold, restoring the previous status
    ///
    /// Returns false if the task was not on hold.
    pub fn release_hold(&mut self) -> bool {
        if !self.is_on_hold() {
            return false;
        }
        self.is_hold_task = false;
        self.status = self
            .status_before_hold
            .take()
            .unwrap_or(TaskStatus::NotStarted);
        self.hold_reason_id = None;
        self.touch();
        true
    }

    /// Checks the record-level invariants
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err(format!("task {} has an empty name", self.id));
        }
        if self.duration_days == 0 {
            return Err(format!("task {} has a zero duration", self.id));
        }
        if self.end_date < self.start_date {
            return Err(format!(
                "task {} ends ({}) before it starts ({})",
                self.id, self.end_date, self.start_date
            ));
        }
        if self.is_hold_task != (self.status == TaskStatus::OnHold) {
            return Err(format!(
                "task {} has is_hold_task={} but status {}",
                self.id, self.is_hold_task, self.status
            ));
        }
        if self.predecessor_ids.contains(&self.id) {
            return Err(format!("task {} depends on itself", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn make_task() -> Task {
        let new = NewTask::new("Frame walls", d("2024-01-06"), 3);
        Task::scheduled(TaskId::new(1), 1, &new, &WorkingCalendar::default()).unwrap()
    }

    #[test]
    fn scheduled_task_normalizes_dates() {
        let task = make_task();
        assert_eq!(task.start_date, d("2024-01-08"));
        assert_eq!(task.end_date, d("2024-01-10"));
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert_eq!(task.lock_type, LockType::None);
        assert!(!task.is_locked());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn zero_duration_is_one_day() {
        let new = NewTask::new("Inspect", d("2024-01-08"), 0);
        let task = Task::scheduled(TaskId::new(2), 2, &new, &WorkingCalendar::default()).unwrap();
        assert_eq!(task.duration_days, 1);
        assert_eq!(task.end_date, task.start_date);
    }

    #[test]
    fn hold_and_release_round_trip_status() {
        let mut task = make_task();
        task.status = TaskStatus::Started;

        task.place_on_hold(HoldReasonId::new(3));
        assert!(task.is_on_hold());
        assert_eq!(task.status, TaskStatus::OnHold);
        assert_eq!(task.hold_reason_id, Some(HoldReasonId::new(3)));
        assert!(task.validate().is_ok());

        assert!(task.release_hold());
        assert_eq!(task.status, TaskStatus::Started);
        assert!(!task.is_hold_task);
        assert_eq!(task.hold_reason_id, None);
        assert!(!task.release_hold());
    }

    #[test]
    fn changing_hold_reason_keeps_original_status() {
        let mut task = make_task();
        task.place_on_hold(HoldReasonId::new(1));
        task.place_on_hold(HoldReasonId::new(2));
        assert_eq!(task.status_before_hold, Some(TaskStatus::NotStarted));
        assert_eq!(task.hold_reason_id, Some(HoldReasonId::new(2)));
    }

    #[test]
    fn validate_catches_hold_mismatch() {
        let mut task = make_task();
        task.is_hold_task = true;
        assert!(task.validate().is_err());
    }

    #[test]
    fn validate_catches_inverted_dates() {
        let mut task = make_task();
        task.end_date = d("2024-01-01");
        assert!(task.validate().is_err());
    }

    #[test]
    fn serde_defaults_for_optional_fields() {
        let json = r#"{
            "id": 4,
            "task_number": 4,
            "name": "Roof",
            "start_date": "2024-02-01",
            "end_date": "2024-02-02",
            "duration_days": 2,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;

        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert_eq!(task.lock_type, LockType::None);
        assert!(task.predecessor_ids.is_empty());
    }

    #[test]
    fn serde_rejects_unknown_status() {
        let json = r#"{
            "id": 4, "task_number": 4, "name": "Roof",
            "start_date": "2024-02-01", "end_date": "2024-02-02", "duration_days": 2,
            "status": "paused",
            "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Task>(json).is_err());
    }
}
