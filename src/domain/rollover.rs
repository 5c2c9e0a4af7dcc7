//! Daily rollover sweep
//!
//! Tasks that are still not started but whose start date has passed are moved
//! to today, cascading like any other move. The sweep never forces anything:
//! a task is skipped when it is locked, on hold, waiting on unfinished
//! predecessors, or when moving it would shift a locked successor.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::calendar::WorkingCalendar;
use super::cascade::plan_move;
use super::error::Result;
use super::graph::TaskGraph;
use super::id::TaskId;
use super::resolver::commit;
use super::task::{Task, TaskStatus};

/// Outcome of one sweep over a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloverReport {
    pub date: NaiveDate,
    /// Overdue tasks considered
    pub checked: usize,
    pub moved: Vec<TaskId>,
    pub skipped_locked: Vec<TaskId>,
    pub skipped_hold: Vec<TaskId>,
    pub skipped_pending_predecessors: Vec<TaskId>,
    pub skipped_locked_successors: Vec<TaskId>,
    /// Moves that shifted at least one successor
    pub cascades_triggered: usize,
    /// Successor date changes across all moves
    pub successors_moved: usize,
}

impl RolloverReport {
    /// A report with nothing checked
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            checked: 0,
            moved: Vec::new(),
            skipped_locked: Vec::new(),
            skipped_hold: Vec::new(),
            skipped_pending_predecessors: Vec::new(),
            skipped_locked_successors: Vec::new(),
            cascades_triggered: 0,
            successors_moved: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_locked.len()
            + self.skipped_hold.len()
            + self.skipped_pending_predecessors.len()
            + self.skipped_locked_successors.len()
    }

    /// Merges another project's report into this one
    pub fn absorb(&mut self, other: RolloverReport) {
        self.checked += other.checked;
        self.moved.extend(other.moved);
        self.skipped_locked.extend(other.skipped_locked);
        self.skipped_hold.extend(other.skipped_hold);
        self.skipped_pending_predecessors
            .extend(other.skipped_pending_predecessors);
        self.skipped_locked_successors
            .extend(other.skipped_locked_successors);
        self.cascades_triggered += other.cascades_triggered;
        self.successors_moved += other.successors_moved;
    }
}

/// Not started (directly or before being held) and starting before `today`
fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    let not_started = match task.status {
        TaskStatus::NotStarted => true,
        TaskStatus::OnHold => matches!(
            task.status_before_hold,
            None | Some(TaskStatus::NotStarted)
        ),
        TaskStatus::Started | TaskStatus::Completed => false,
    };
    not_started && task.start_date < today
}

/// Runs the sweep against one project's graph
///
/// Candidates are visited by start date, then task number, so earlier
/// cascades are visible to later candidates. A failed commit aborts the sweep
/// with the graph holding every move committed before it.
pub fn sweep(
    graph: &mut TaskGraph,
    calendar: &WorkingCalendar,
    today: NaiveDate,
) -> Result<RolloverReport> {
    let mut report = RolloverReport::empty(today);

    let mut candidates: Vec<(NaiveDate, u32, TaskId)> = graph
        .tasks()
        .filter(|t| is_overdue(t, today))
        .map(|t| (t.start_date, t.task_number, t.id))
        .collect();
    candidates.sort();
    report.checked = candidates.len();

    let none_confirmed = BTreeSet::new();

    for (_, _, id) in candidates {
        let task = graph.task(id)?;

        // An earlier cascade may already have pushed it forward
        if !is_overdue(task, today) {
            debug!(task = %id, "Already current");
            continue;
        }
        if task.is_locked() {
            debug!(task = %id, lock = %task.lock_type, "Skipping locked task");
            report.skipped_locked.push(id);
            continue;
        }
        if task.is_on_hold() {
            debug!(task = %id, "Skipping held task");
            report.skipped_hold.push(id);
            continue;
        }

        let mut pending = false;
        for pred in &task.predecessor_ids {
            if !graph.task(*pred)?.status.is_complete() {
                pending = true;
                break;
            }
        }
        if pending {
            debug!(task = %id, "Skipping task with unfinished predecessors");
            report.skipped_pending_predecessors.push(id);
            continue;
        }

        let plan = plan_move(graph, calendar, id, today)?;
        if plan.is_empty() {
            continue;
        }
        if plan.needs_confirmation() {
            debug!(task = %id, "Skipping task whose move would shift a locked successor");
            report.skipped_locked_successors.push(id);
            continue;
        }

        let applied = commit(graph, calendar, &plan, &none_confirmed)?;
        let successors = applied
            .applied
            .iter()
            .filter(|e| e.task_id != id)
            .count();
        if successors > 0 {
            report.cascades_triggered += 1;
            report.successors_moved += successors;
        }
        report.moved.push(id);
    }

    info!(
        date = %today,
        moved = report.moved.len(),
        skipped = report.skipped(),
        "Rollover sweep finished"
    );
    Ok(report)
}
