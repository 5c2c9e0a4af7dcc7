//! Confirmation protocol and cascade commit
//!
//! A move either applies directly or comes back asking which locked
//! successors may be force-moved. Committing always re-plans first: a plan is
//! advisory, so if anything changed since it was computed the commit fails
//! with [`ScheduleError::StaleCascade`] and the caller plans again.
//!
//! Locked successors left out of the confirmed set are pinned at their stored
//! dates and the cascade is re-planned around them. Everything downstream of a
//! pinned task is planned against the pinned dates, so it stays put too.
//! Edges into a pinned task that its moved predecessor now overlaps are
//! detached and reported.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::calendar::WorkingCalendar;
use super::cascade::{plan_move, plan_move_pinned, CascadePlan, PlanEntry};
use super::error::{Result, ScheduleError};
use super::graph::{Dependency, TaskGraph};
use super::id::TaskId;

/// What a commit wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    /// Date changes written, in plan order
    pub applied: Vec<PlanEntry>,
    /// Locked successors held at their dates
    pub excluded: BTreeSet<TaskId>,
    /// Edges removed because an excluded task could not follow its predecessor
    pub detached: Vec<Dependency>,
}

/// Result of a move request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub committed: bool,
    pub needs_confirmation: bool,
    pub plan: CascadePlan,
    #[serde(flatten)]
    pub report: CommitReport,
}

/// Plans a move and applies it unless confirmation is required
///
/// With `confirmed == None` a plan that shifts locked successors is returned
/// uncommitted. Passing a set (even an empty one) is the re-submission: listed
/// locked tasks move, unlisted ones are excluded.
pub fn resolve_move(
    graph: &mut TaskGraph,
    calendar: &WorkingCalendar,
    task_id: TaskId,
    requested_start: NaiveDate,
    confirmed: Option<&BTreeSet<TaskId>>,
) -> Result<MoveOutcome> {
    let plan = plan_move(graph, calendar, task_id, requested_start)?;
    let none_confirmed = BTreeSet::new();

    let confirmed = match confirmed {
        Some(ids) => ids,
        None if plan.needs_confirmation() => {
            debug!(
                task = %task_id,
                locked = plan.locked_successors().count(),
                "Move needs confirmation"
            );
            return Ok(MoveOutcome {
                committed: false,
                needs_confirmation: true,
                plan,
                report: CommitReport::default(),
            });
        }
        None => &none_confirmed,
    };

    let report = commit(graph, calendar, &plan, confirmed)?;
    Ok(MoveOutcome {
        committed: true,
        needs_confirmation: false,
        plan,
        report,
    })
}

/// Applies a previously computed plan atomically
///
/// Fails with `StaleCascade` if re-planning the same move against the current
/// graph no longer yields `plan`, or if the result would leave an overlapping
/// dependency. On any error the graph is left untouched.
pub fn commit(
    graph: &mut TaskGraph,
    calendar: &WorkingCalendar,
    plan: &CascadePlan,
    confirmed: &BTreeSet<TaskId>,
) -> Result<CommitReport> {
    let fresh = plan_move(graph, calendar, plan.moved_task_id, plan.requested_start)?;
    if &fresh != plan {
        return Err(ScheduleError::StaleCascade(plan.moved_task_id));
    }

    let locked: BTreeSet<TaskId> = plan.locked_successors().map(|e| e.task_id).collect();
    for id in confirmed.difference(&locked) {
        debug!(task = %id, "Confirmed task is not a locked successor, ignoring");
    }
    let excluded: BTreeSet<TaskId> = locked.difference(confirmed).copied().collect();

    let effective = if excluded.is_empty() {
        fresh
    } else {
        plan_move_pinned(
            graph,
            calendar,
            plan.moved_task_id,
            plan.requested_start,
            &excluded,
        )?
    };

    let mut draft = graph.clone();
    for entry in &effective.entries {
        draft.write_dates(entry.task_id, entry.new_start, entry.new_end)?;
    }

    let mut detached = Vec::new();
    for id in &excluded {
        let task = draft.task(*id)?;
        let start = task.start_date;
        let overlapping: Vec<TaskId> = task
            .predecessor_ids
            .iter()
            .filter(|p| draft.task(**p).map(|p| start < p.end_date).unwrap_or(false))
            .copied()
            .collect();
        for pred in overlapping {
            draft.remove_dependency(*id, pred);
            info!(predecessor = %pred, successor = %id, "Detached dependency from excluded task");
            detached.push(Dependency {
                predecessor_id: pred,
                successor_id: *id,
            });
        }
    }

    let touched: Vec<TaskId> = effective
        .entries
        .iter()
        .map(|e| e.task_id)
        .chain(excluded.iter().copied())
        .collect();
    if !draft.overlapping_edges(&touched)?.is_empty() {
        return Err(ScheduleError::StaleCascade(plan.moved_task_id));
    }

    *graph = draft;
    info!(
        task = %plan.moved_task_id,
        applied = effective.entries.len(),
        excluded = excluded.len(),
        "Committed cascade"
    );

    Ok(CommitReport {
        applied: effective.entries,
        excluded,
        detached,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lock::LockTransition;
    use crate::domain::task::{NewTask, Task};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn id(n: u64) -> TaskId {
        TaskId::new(n)
    }

    fn add(graph: &mut TaskGraph, n: u64, start: &str, duration: u32, preds: &[u64]) {
        let new = NewTask::new(format!("Task {}", n), d(start), duration)
            .after(preds.iter().map(|p| id(*p)));
        let mut task =
            Task::scheduled(id(n), n as u32, &new, &WorkingCalendar::default()).unwrap();
        task.predecessor_ids = new.predecessor_ids.clone();
        graph.add_task(task).unwrap();
    }

    /// A (5 days) -> B (started) -> C
    fn chain_with_locked_middle() -> TaskGraph {
        let mut graph = TaskGraph::new();
        add(&mut graph, 1, "2024-01-01", 5, &[]);
        add(&mut graph, 2, "2024-01-08", 1, &[1]);
        add(&mut graph, 3, "2024-01-09", 1, &[2]);
        graph.transition_lock(id(2), LockTransition::Start).unwrap();
        graph
    }

    #[test]
    fn direct_apply_commits_everything() {
        let mut graph = TaskGraph::new();
        add(&mut graph, 1, "2024-01-01", 5, &[]);
        add(&mut graph, 2, "2024-01-08", 2, &[1]);
        let cal = WorkingCalendar::default();

        let outcome = resolve_move(&mut graph, &cal, id(1), d("2024-01-03"), None).unwrap();

        assert!(outcome.committed);
        assert!(!outcome.needs_confirmation);
        assert_eq!(graph.task(id(1)).unwrap().end_date, d("2024-01-09"));
        assert_eq!(graph.task(id(2)).unwrap().start_date, d("2024-01-09"));
        assert_eq!(outcome.report.applied.len(), 2);
    }

    #[test]
    fn locked_successor_blocks_without_writes() {
        let mut graph = chain_with_locked_middle();
        let before = graph.clone();
        let cal = WorkingCalendar::default();

        let outcome = resolve_move(&mut graph, &cal, id(1), d("2024-01-08"), None).unwrap();

        assert!(!outcome.committed);
        assert!(outcome.needs_confirmation);
        assert_eq!(graph.task(id(1)).unwrap(), before.task(id(1)).unwrap());
        assert_eq!(graph.task(id(2)).unwrap(), before.task(id(2)).unwrap());
        assert_eq!(graph.task(id(3)).unwrap(), before.task(id(3)).unwrap());
    }

    #[test]
    fn unconfirmed_lock_stops_the_cascade() {
        let mut graph = chain_with_locked_middle();
        let cal = WorkingCalendar::default();

        let outcome = resolve_move(
            &mut graph,
            &cal,
            id(1),
            d("2024-01-08"),
            Some(&BTreeSet::new()),
        )
        .unwrap();

        assert!(outcome.committed);
        assert_eq!(outcome.report.excluded, BTreeSet::from([id(2)]));
        assert_eq!(graph.task(id(1)).unwrap().start_date, d("2024-01-08"));
        // B and C keep their dates even though C is unlocked
        assert_eq!(graph.task(id(2)).unwrap().start_date, d("2024-01-08"));
        assert_eq!(graph.task(id(3)).unwrap().start_date, d("2024-01-09"));

        // A now ends after B starts, so the edge is detached
        assert_eq!(
            outcome.report.detached,
            vec![Dependency {
                predecessor_id: id(1),
                successor_id: id(2)
            }]
        );
        assert!(graph.task(id(2)).unwrap().predecessor_ids.is_empty());
        assert!(graph.task(id(3)).unwrap().predecessor_ids.contains(&id(2)));
    }

    #[test]
    fn confirmed_lock_is_force_moved() {
        let mut graph = chain_with_locked_middle();
        let cal = WorkingCalendar::default();

        let outcome = resolve_move(
            &mut graph,
            &cal,
            id(1),
            d("2024-01-08"),
            Some(&BTreeSet::from([id(2)])),
        )
        .unwrap();

        assert!(outcome.committed);
        assert!(outcome.report.excluded.is_empty());
        assert_eq!(graph.task(id(1)).unwrap().end_date, d("2024-01-12"));
        assert_eq!(graph.task(id(2)).unwrap().start_date, d("2024-01-12"));
        assert_eq!(graph.task(id(3)).unwrap().start_date, d("2024-01-12"));
        // Moving never changes a lock
        assert!(graph.task(id(2)).unwrap().is_locked());
    }

    #[test]
    fn stale_plan_is_rejected() {
        let mut graph = chain_with_locked_middle();
        let cal = WorkingCalendar::default();
        let plan = plan_move(&graph, &cal, id(1), d("2024-01-08")).unwrap();

        // Another write lands between planning and confirmation
        graph
            .write_dates(id(3), d("2024-01-10"), d("2024-01-10"))
            .unwrap();
        let before = graph.clone();

        let result = commit(&mut graph, &cal, &plan, &BTreeSet::from([id(2)]));
        assert!(matches!(result, Err(ScheduleError::StaleCascade(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(graph.task(id(1)).unwrap(), before.task(id(1)).unwrap());
    }

    #[test]
    fn replanning_after_commit_is_empty() {
        let mut graph = TaskGraph::new();
        add(&mut graph, 1, "2024-01-01", 3, &[]);
        add(&mut graph, 2, "2024-01-03", 2, &[1]);
        add(&mut graph, 3, "2024-01-04", 4, &[1, 2]);
        let cal = WorkingCalendar::default();

        resolve_move(&mut graph, &cal, id(1), d("2024-01-10"), None).unwrap();
        let again = plan_move(&graph, &cal, id(1), d("2024-01-10")).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn moving_a_locked_task_itself_is_direct() {
        let mut graph = TaskGraph::new();
        add(&mut graph, 1, "2024-01-01", 2, &[]);
        graph.transition_lock(id(1), LockTransition::Confirm).unwrap();
        let cal = WorkingCalendar::default();

        let outcome = resolve_move(&mut graph, &cal, id(1), d("2024-01-15"), None).unwrap();
        assert!(outcome.committed);
        assert_eq!(graph.task(id(1)).unwrap().start_date, d("2024-01-15"));
    }
}
