//! Cascade planner
//!
//! Computes every date change needed to keep finish-to-start dependencies
//! consistent after one task moves. Planning is a pure function of the graph
//! and calendar: nothing is written, and the same input always yields the
//! same plan.
//!
//! ## Algorithm
//!
//! 1. The requested start is rolled to a working day and clamped so the
//!    moved task still starts no earlier than its own predecessors allow.
//! 2. The moved task's end is re-derived from its duration.
//! 3. Tasks reachable from the moved task are visited in dependency order
//!    (ties broken by id). Each successor `S` needs
//!    `start >= max(next_working_day(P.end))` over *all* its predecessors,
//!    using planned dates where a predecessor moves. Successors that already
//!    satisfy the bound are left out of the plan.
//! 4. Entries are ordered by depth (longest dependency path from the moved
//!    task), then id, so predecessors always precede their successors.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use super::calendar::WorkingCalendar;
use super::error::Result;
use super::graph::TaskGraph;
use super::id::TaskId;
use super::lock::LockType;
use super::task::Task;

/// One task's date change within a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub task_id: TaskId,
    pub task_number: u32,
    pub name: String,
    pub old_start: NaiveDate,
    pub old_end: NaiveDate,
    pub new_start: NaiveDate,
    pub new_end: NaiveDate,
    pub is_locked: bool,
    pub lock_type: LockType,
    /// Longest dependency path from the moved task (0 for the task itself)
    pub depth: u32,
}

impl PlanEntry {
    fn new(task: &Task, new_start: NaiveDate, new_end: NaiveDate, depth: u32) -> Self {
        Self {
            task_id: task.id,
            task_number: task.task_number,
            name: task.name.clone(),
            old_start: task.start_date,
            old_end: task.end_date,
            new_start,
            new_end,
            is_locked: task.is_locked(),
            lock_type: task.lock_type,
            depth,
        }
    }
}

/// Direction the moved task travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Forward,
    Backward,
    Unchanged,
}

/// Counts for a confirmation prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub direction: MoveDirection,
    /// Calendar days between the moved task's old and new start
    pub days_moved: i64,
    /// Unlocked successors that will move
    pub will_cascade: usize,
    /// Locked successors that need confirmation
    pub blocked: usize,
}

/// The non-committed result of evaluating a proposed move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadePlan {
    pub moved_task_id: TaskId,
    pub requested_start: NaiveDate,
    pub entries: Vec<PlanEntry>,
}

impl CascadePlan {
    /// Returns true if nothing would change
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: TaskId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.task_id == id)
    }

    /// Locked successors the plan would shift; the moved task never counts
    pub fn locked_successors(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(move |e| e.is_locked && e.task_id != self.moved_task_id)
    }

    /// Returns true if the plan cannot be applied without confirmation
    pub fn needs_confirmation(&self) -> bool {
        self.locked_successors().next().is_some()
    }

    pub fn summary(&self) -> PlanSummary {
        let (direction, days_moved) = match self.entry(self.moved_task_id) {
            Some(e) => {
                let days = (e.new_start - e.old_start).num_days();
                let direction = match days {
                    d if d > 0 => MoveDirection::Forward,
                    d if d < 0 => MoveDirection::Backward,
                    _ => MoveDirection::Unchanged,
                };
                (direction, days.abs())
            }
            None => (MoveDirection::Unchanged, 0),
        };

        let blocked = self.locked_successors().count();
        let will_cascade = self
            .entries
            .iter()
            .filter(|e| e.task_id != self.moved_task_id && !e.is_locked)
            .count();

        PlanSummary {
            direction,
            days_moved,
            will_cascade,
            blocked,
        }
    }
}

/// Plans moving `task_id` to start on `requested_start`
pub fn plan_move(
    graph: &TaskGraph,
    calendar: &WorkingCalendar,
    task_id: TaskId,
    requested_start: NaiveDate,
) -> Result<CascadePlan> {
    plan_move_pinned(graph, calendar, task_id, requested_start, &BTreeSet::new())
}

/// Plans a move while holding `pinned` tasks at their stored dates
///
/// Pinned tasks never appear in the plan, and anything downstream of them is
/// planned against their original dates, so a cascade stops at a pinned task
/// instead of skipping over it.
pub fn plan_move_pinned(
    graph: &TaskGraph,
    calendar: &WorkingCalendar,
    task_id: TaskId,
    requested_start: NaiveDate,
    pinned: &BTreeSet<TaskId>,
) -> Result<CascadePlan> {
    let task = graph.task(task_id)?;

    let mut new_start = calendar.next_working_day(requested_start)?;
    for pred in &task.predecessor_ids {
        let bound = calendar.next_working_day(graph.task(*pred)?.end_date)?;
        new_start = new_start.max(bound);
    }
    let new_end = calendar.end_date_for(new_start, task.duration_days)?;

    let mut planned: HashMap<TaskId, NaiveDate> = HashMap::from([(task_id, new_end)]);
    let mut depth: HashMap<TaskId, u32> = HashMap::from([(task_id, 0)]);
    let mut entries = Vec::new();

    if (new_start, new_end) != (task.start_date, task.end_date) {
        entries.push(PlanEntry::new(task, new_start, new_end, 0));
    }

    // Kahn's algorithm over the reachable subgraph only
    let affected = graph.descendants(task_id)?;
    let mut pending: BTreeMap<TaskId, usize> = BTreeMap::new();
    for id in &affected {
        let inside = graph
            .task(*id)?
            .predecessor_ids
            .iter()
            .filter(|p| **p == task_id || affected.contains(p))
            .count();
        pending.insert(*id, inside);
    }

    let mut ready: BTreeSet<TaskId> = BTreeSet::new();
    release_successors(graph, task_id, &mut pending, &mut ready)?;

    while let Some(id) = ready.pop_first() {
        let succ = graph.task(id)?;

        let level = succ
            .predecessor_ids
            .iter()
            .filter_map(|p| depth.get(p))
            .max()
            .map(|d| d + 1)
            .unwrap_or(1);
        depth.insert(id, level);

        if !pinned.contains(&id) {
            let mut bound: Option<NaiveDate> = None;
            for pred in &succ.predecessor_ids {
                let pred_end = match planned.get(pred) {
                    Some(end) => *end,
                    None => graph.task(*pred)?.end_date,
                };
                let candidate = calendar.next_working_day(pred_end)?;
                bound = Some(bound.map_or(candidate, |b| b.max(candidate)));
            }

            if let Some(bound) = bound.filter(|b| succ.start_date < *b) {
                let end = calendar.end_date_for(bound, succ.duration_days)?;
                planned.insert(id, end);
                entries.push(PlanEntry::new(succ, bound, end, level));
            }
        }

        release_successors(graph, id, &mut pending, &mut ready)?;
    }

    entries.sort_by_key(|e| (e.depth, e.task_id));

    Ok(CascadePlan {
        moved_task_id: task_id,
        requested_start,
        entries,
    })
}

fn release_successors(
    graph: &TaskGraph,
    id: TaskId,
    pending: &mut BTreeMap<TaskId, usize>,
    ready: &mut BTreeSet<TaskId>,
) -> Result<()> {
    for succ in graph.successors(id)? {
        if let Some(count) = pending.get_mut(&succ) {
            *count -= 1;
            if *count == 0 {
                ready.insert(succ);
            }
        }
    }
    Ok(())
}
