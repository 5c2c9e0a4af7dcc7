//! Task CLI commands

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Subcommand;

use super::app::Session;
use crate::domain::{
    HoldChange, HoldReasonId, LockTransition, NewTask, Task, TaskId, TaskUpdate, TemplateRowId,
};
use crate::engine::TaskView;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    ///
    /// Examples:
    ///   sm task add "Slab pour" --start 2024-03-04 --days 2
    ///   sm task add "Frame" --start 2024-03-06 --days 5 --after 1
    Add {
        /// Task name
        name: String,

        /// First working day (rolled forward to a working day)
        #[arg(long)]
        start: NaiveDate,

        /// Duration in working days
        #[arg(long, default_value = "1")]
        days: u32,

        /// Predecessor task IDs, comma separated
        #[arg(long, value_delimiter = ',')]
        after: Vec<TaskId>,
    },

    /// Create a task from a template row, wired after earlier rows' tasks
    FromTemplate {
        /// Template row ID
        row: TemplateRowId,

        /// Start date (required when the row has no scheduled predecessors)
        #[arg(long)]
        start: Option<NaiveDate>,
    },

    /// List tasks
    List,

    /// Show task details
    Show {
        /// Task ID
        id: TaskId,
    },

    /// Rename a task
    Update {
        /// Task ID
        id: TaskId,

        /// New name
        #[arg(long)]
        name: String,
    },

    /// Delete an unlocked task
    Delete {
        /// Task ID
        id: TaskId,
    },

    /// Replace a task's predecessors (none clears them)
    Deps {
        /// Task ID
        id: TaskId,

        /// Predecessor task IDs
        predecessors: Vec<TaskId>,
    },

    /// Mark a task as started
    Start {
        /// Task ID
        id: TaskId,
    },

    /// Mark a started task as completed
    Complete {
        /// Task ID
        id: TaskId,
    },

    /// Lock a task as confirmed
    Confirm {
        /// Task ID
        id: TaskId,
    },

    /// Lock a confirmed task as supplier-confirmed
    SupplierConfirm {
        /// Task ID
        id: TaskId,
    },

    /// Clear a confirm or supplier-confirm lock
    Unlock {
        /// Task ID
        id: TaskId,
    },

    /// Put a task on hold
    Hold {
        /// Task ID
        id: TaskId,

        /// Hold reason ID
        reason: HoldReasonId,
    },

    /// Release a held task, restoring its previous status
    Release {
        /// Task ID
        id: TaskId,
    },
}

pub fn run(cmd: TaskCommands, session: &Session) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            name,
            start,
            days,
            after,
        } => {
            let project = session.project()?;
            let task = session
                .engine
                .add_task(&project, NewTask::new(name, start, days).after(after))?;
            print_created(session, &task);
        }
        TaskCommands::FromTemplate { row, start } => {
            let project = session.project()?;
            let task = session.engine.create_from_template(&project, row, start)?;
            print_created(session, &task);
        }
        TaskCommands::List => list_tasks(session)?,
        TaskCommands::Show { id } => show_task(session, id)?,
        TaskCommands::Update { id, name } => {
            let update = TaskUpdate {
                name: Some(name),
                ..Default::default()
            };
            apply_update(session, id, update, "Renamed task")?;
        }
        TaskCommands::Delete { id } => {
            let project = session.project()?;
            let task = session.engine.delete_task(&project, id)?;
            if session.output.is_json() {
                session.output.data(&task);
            } else {
                session
                    .output
                    .success(&format!("Deleted task: {} - {}", task.id, task.name));
            }
        }
        TaskCommands::Deps { id, predecessors } => {
            let project = session.project()?;
            let predecessors: BTreeSet<TaskId> = predecessors.into_iter().collect();
            let task = session
                .engine
                .set_dependencies(&project, id, &predecessors)?;
            if session.output.is_json() {
                session.output.data(&task);
            } else if task.predecessor_ids.is_empty() {
                session
                    .output
                    .success(&format!("Task {} has no predecessors", task.id));
            } else {
                session.output.success(&format!(
                    "Task {} now follows {} (starts {})",
                    task.id,
                    join_ids(&task.predecessor_ids),
                    task.start_date
                ));
            }
        }
        TaskCommands::Start { id } => lock(session, id, LockTransition::Start, "Started task")?,
        TaskCommands::Complete { id } => {
            lock(session, id, LockTransition::Complete, "Completed task")?
        }
        TaskCommands::Confirm { id } => lock(session, id, LockTransition::Confirm, "Confirmed task")?,
        TaskCommands::SupplierConfirm { id } => lock(
            session,
            id,
            LockTransition::SupplierConfirm,
            "Supplier-confirmed task",
        )?,
        TaskCommands::Unlock { id } => lock(session, id, LockTransition::Unlock, "Unlocked task")?,
        TaskCommands::Hold { id, reason } => {
            let update = TaskUpdate {
                hold: Some(HoldChange::Place(reason)),
                ..Default::default()
            };
            apply_update(session, id, update, "Held task")?;
        }
        TaskCommands::Release { id } => {
            let update = TaskUpdate {
                hold: Some(HoldChange::Release),
                ..Default::default()
            };
            apply_update(session, id, update, "Released task")?;
        }
    }

    Ok(())
}

pub(super) fn join_ids<'a>(ids: impl IntoIterator<Item = &'a TaskId>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn print_created(session: &Session, task: &Task) {
    if session.output.is_json() {
        session.output.data(task);
    } else {
        session.output.success(&format!(
            "Created task: {} - {} ({} to {})",
            task.id, task.name, task.start_date, task.end_date
        ));
    }
}

fn lock(session: &Session, id: TaskId, transition: LockTransition, verb: &str) -> Result<()> {
    let update = TaskUpdate {
        lock: Some(transition),
        ..Default::default()
    };
    apply_update(session, id, update, verb)
}

fn apply_update(session: &Session, id: TaskId, update: TaskUpdate, verb: &str) -> Result<()> {
    let project = session.project()?;
    let task = session.engine.update_task(&project, id, update)?;

    if session.output.is_json() {
        session.output.data(&task);
    } else {
        session.output.success(&format!(
            "{}: {} - {} [{}, lock {}]",
            verb, task.id, task.name, task.status, task.lock_type
        ));
    }
    Ok(())
}

fn list_tasks(session: &Session) -> Result<()> {
    let project = session.project()?;
    let graph = session.engine.get_graph(&project)?;

    if session.output.is_json() {
        session.output.data(&graph.tasks);
    } else if graph.tasks.is_empty() {
        println!("No tasks");
    } else {
        println!(
            "{:<5} {:<11} {:<11} {:>4} {:<12} {:<17} NAME",
            "ID", "START", "END", "DAYS", "STATUS", "LOCK"
        );
        println!("{}", "-".repeat(80));

        for view in &graph.tasks {
            let t = &view.task;
            println!(
                "{:<5} {:<11} {:<11} {:>4} {:<12} {:<17} {}",
                t.id,
                t.start_date.to_string(),
                t.end_date.to_string(),
                t.duration_days,
                t.status.as_str(),
                t.lock_type.as_str(),
                t.name
            );
        }
    }

    Ok(())
}

fn show_task(session: &Session, id: TaskId) -> Result<()> {
    let project = session.project()?;
    let view = session.engine.get_task(&project, id)?;

    if session.output.is_json() {
        session.output.data(&view);
        return Ok(());
    }

    let TaskView {
        task,
        hold_reason_name,
        successor_ids,
        ..
    } = &view;

    println!("Task: {}", task.id);
    println!("Name: {}", task.name);
    println!("Dates: {} to {} ({} working days)", task.start_date, task.end_date, task.duration_days);
    println!("Status: {}", task.status);
    println!("Lock: {}", task.lock_type);
    if let Some(reason) = task.hold_reason_id {
        match hold_reason_name {
            Some(name) => println!("Hold: {} ({})", name, reason),
            None => println!("Hold: reason {} (deleted)", reason),
        }
    }
    if let Some(row) = task.template_row_id {
        println!("Template row: {}", row);
    }
    if !task.predecessor_ids.is_empty() {
        println!("After: {}", join_ids(&task.predecessor_ids));
    }
    if !successor_ids.is_empty() {
        println!("Before: {}", join_ids(successor_ids));
    }
    println!("Created: {}", task.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated: {}", task.updated_at.format("%Y-%m-%d %H:%M"));

    Ok(())
}
