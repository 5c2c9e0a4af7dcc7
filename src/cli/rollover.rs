//! Rollover commands

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Subcommand;

use super::app::Session;
use super::task::join_ids;
use crate::domain::RolloverReport;
use crate::engine::{today_in, RolloverJob};

#[derive(Subcommand)]
pub enum RolloverCommands {
    /// Sweep overdue tasks forward now
    ///
    /// Without --project every enabled project is swept, each as of its own
    /// timezone's today unless --date is given.
    Run {
        /// Treat this date as today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show when the next scheduled sweep is due
    Next,

    /// Run the sweep at its configured time until interrupted
    Watch {
        /// Stop after this many runs
        #[arg(long)]
        runs: Option<usize>,
    },
}

pub fn run(cmd: RolloverCommands, session: &Session) -> Result<()> {
    let job = RolloverJob::new(&session.engine);

    match cmd {
        RolloverCommands::Run { date } => {
            let report = match (session.explicit_project()?, date) {
                (Some(project), Some(today)) => session.engine.run_rollover(&project, today)?,
                (Some(project), None) => {
                    let settings = session.engine.get_settings(Some(&project))?;
                    let today = today_in(settings.rollover.timezone, Utc::now());
                    session.engine.run_rollover(&project, today)?
                }
                (None, Some(today)) => {
                    let mut total = RolloverReport::empty(today);
                    for project in session.engine.list_projects()? {
                        total.absorb(session.engine.run_rollover(&project, today)?);
                    }
                    total
                }
                (None, None) => job.run_all(Utc::now())?,
            };
            print_report(session, &report);
        }
        RolloverCommands::Next => {
            let next = job.next_run(Utc::now())?;
            if session.output.is_json() {
                session.output.data(&serde_json::json!({ "next_run": next }));
            } else {
                match next {
                    Some(at) => println!("Next rollover: {}", at.to_rfc3339()),
                    None => println!("Rollover is disabled"),
                }
            }
        }
        RolloverCommands::Watch { runs } => job.watch(runs)?,
    }

    Ok(())
}

fn print_report(session: &Session, report: &RolloverReport) {
    if session.output.is_json() {
        session.output.data(report);
        return;
    }

    session.output.success(&format!(
        "Rollover for {}: checked {}, moved {}, skipped {}",
        report.date,
        report.checked,
        report.moved.len(),
        report.skipped()
    ));
    if !report.moved.is_empty() {
        println!("  Moved: {}", join_ids(&report.moved));
    }
    if report.cascades_triggered > 0 {
        println!(
            "  Cascades: {} ({} successor(s) moved)",
            report.cascades_triggered, report.successors_moved
        );
    }
    let skipped = [
        ("Locked", &report.skipped_locked),
        ("On hold", &report.skipped_hold),
        ("Waiting on predecessors", &report.skipped_pending_predecessors),
        ("Would move locked successors", &report.skipped_locked_successors),
    ];
    for (label, ids) in skipped {
        if !ids.is_empty() {
            println!("  {}: {}", label, join_ids(ids));
        }
    }
}
