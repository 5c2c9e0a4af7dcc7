//! Graph and move commands

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;

use super::app::Session;
use super::task::join_ids;
use crate::domain::{CascadePlan, MoveDirection, TaskId};

#[derive(Args)]
pub struct MoveArgs {
    /// Task to move
    pub task: TaskId,

    /// Requested start date (YYYY-MM-DD)
    pub date: NaiveDate,

    /// Locked successors allowed to move, comma separated
    #[arg(long, value_delimiter = ',')]
    pub confirm: Vec<TaskId>,

    /// Move without touching locked successors; overlapping links to them are removed
    #[arg(long, conflicts_with = "confirm")]
    pub skip_locked: bool,

    /// Show the plan without changing anything
    #[arg(long)]
    pub preview: bool,
}

pub fn graph(session: &Session) -> Result<()> {
    let project = session.project()?;
    let view = session.engine.get_graph(&project)?;

    if session.output.is_json() {
        session.output.data(&view);
        return Ok(());
    }

    println!("Project: {}", view.project);
    if view.tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    println!();
    for t in &view.tasks {
        let marker = if t.is_locked { "*" } else { " " };
        println!(
            "{}{:<5} {} .. {}  {}",
            marker, t.task.id, t.task.start_date, t.task.end_date, t.task.name
        );
        if !t.successor_ids.is_empty() {
            println!("       -> {}", join_ids(&t.successor_ids));
        }
    }
    println!();
    println!(
        "{} tasks, {} dependencies (* locked)",
        view.tasks.len(),
        view.dependencies.len()
    );

    Ok(())
}

pub fn move_task(args: MoveArgs, session: &Session) -> Result<()> {
    let project = session.project()?;

    if args.preview {
        let plan = session.engine.plan_move(&project, args.task, args.date)?;
        if session.output.is_json() {
            session.output.data(&serde_json::json!({
                "plan": plan,
                "summary": plan.summary(),
                "needs_confirmation": plan.needs_confirmation(),
            }));
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let confirmed: BTreeSet<TaskId> = args.confirm.iter().copied().collect();
    let selection = (args.skip_locked || !confirmed.is_empty()).then_some(&confirmed);
    let outcome = session
        .engine
        .move_task(&project, args.task, args.date, selection)?;

    if session.output.is_json() {
        session.output.data(&outcome);
        return Ok(());
    }

    if outcome.needs_confirmation {
        print_plan(&outcome.plan);
        let locked: Vec<_> = outcome.plan.locked_successors().map(|e| e.task_id).collect();
        println!();
        println!("Locked tasks would move. Nothing was changed. Re-run with one of:");
        println!(
            "  sm move {} {} --confirm {}",
            args.task,
            args.date,
            join_ids(&locked)
        );
        println!("  sm move {} {} --skip-locked", args.task, args.date);
        return Ok(());
    }

    let report = &outcome.report;
    if report.applied.is_empty() {
        session.output.success("Nothing to move");
        return Ok(());
    }

    session
        .output
        .success(&format!("Moved {} task(s)", report.applied.len()));
    for e in &report.applied {
        println!(
            "  {:<5} {} -> {}  {}",
            e.task_id, e.old_start, e.new_start, e.name
        );
    }
    if !report.excluded.is_empty() {
        println!("Kept locked: {}", join_ids(&report.excluded));
    }
    for dep in &report.detached {
        println!(
            "Removed link {} -> {} (locked task now overlaps)",
            dep.predecessor_id, dep.successor_id
        );
    }

    Ok(())
}

fn print_plan(plan: &CascadePlan) {
    if plan.is_empty() {
        println!("No changes: task {} already starts there", plan.moved_task_id);
        return;
    }

    let summary = plan.summary();
    let direction = match summary.direction {
        MoveDirection::Forward => "later",
        MoveDirection::Backward => "earlier",
        MoveDirection::Unchanged => "in place",
    };
    println!(
        "Task {} moves {} day(s) {}; {} successor(s) follow, {} locked",
        plan.moved_task_id, summary.days_moved, direction, summary.will_cascade, summary.blocked
    );
    println!();
    println!(
        "{:<5} {:<23} {:<23} {:<17} NAME",
        "ID", "FROM", "TO", "LOCK"
    );
    println!("{}", "-".repeat(80));
    for e in &plan.entries {
        println!(
            "{:<5} {:<23} {:<23} {:<17} {}",
            e.task_id,
            format!("{} .. {}", e.old_start, e.old_end),
            format!("{} .. {}", e.new_start, e.new_end),
            e.lock_type.as_str(),
            e.name
        );
    }
}
