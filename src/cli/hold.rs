//! Hold reason commands

use anyhow::Result;
use clap::Subcommand;

use super::app::Session;
use crate::domain::{HoldReason, HoldReasonId, HoldReasonUpdate, NewHoldReason};

#[derive(Subcommand)]
pub enum HoldCommands {
    /// List hold reasons
    List,

    /// Add a hold reason
    Add {
        /// Reason name
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Display color, e.g. `#3B82F6`
        #[arg(long)]
        color: Option<String>,

        /// Position in pick lists
        #[arg(long)]
        order: Option<u32>,
    },

    /// Change a hold reason
    Update {
        /// Reason ID
        id: HoldReasonId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,

        /// Inactive reasons cannot be used for new holds
        #[arg(long)]
        active: Option<bool>,

        #[arg(long)]
        order: Option<u32>,
    },

    /// Delete a hold reason
    Delete {
        /// Reason ID
        id: HoldReasonId,
    },

    /// Create the starter reasons when none exist
    Seed,
}

pub fn run(cmd: HoldCommands, session: &Session) -> Result<()> {
    let output = &session.output;

    match cmd {
        HoldCommands::List => {
            let reasons = session.engine.list_hold_reasons();
            if output.is_json() {
                output.data(&reasons);
            } else if reasons.is_empty() {
                println!("No hold reasons. Run 'sm hold seed' for a starter set.");
            } else {
                println!("{:<4} {:<8} {:<7} {:<20} DESCRIPTION", "ID", "COLOR", "ACTIVE", "NAME");
                println!("{}", "-".repeat(72));
                for r in &reasons {
                    println!(
                        "{:<4} {:<8} {:<7} {:<20} {}",
                        r.id,
                        r.color,
                        if r.is_active { "yes" } else { "no" },
                        r.name,
                        r.description
                    );
                }
            }
        }
        HoldCommands::Add {
            name,
            description,
            color,
            order,
        } => {
            let reason = session.engine.create_hold_reason(NewHoldReason {
                name,
                description,
                color,
                sequence_order: order,
            })?;
            print_reason(session, "Created hold reason", &reason);
        }
        HoldCommands::Update {
            id,
            name,
            description,
            color,
            active,
            order,
        } => {
            let reason = session.engine.update_hold_reason(
                id,
                HoldReasonUpdate {
                    name,
                    description,
                    color,
                    is_active: active,
                    sequence_order: order,
                },
            )?;
            print_reason(session, "Updated hold reason", &reason);
        }
        HoldCommands::Delete { id } => {
            let reason = session.engine.delete_hold_reason(id)?;
            print_reason(session, "Deleted hold reason", &reason);
        }
        HoldCommands::Seed => {
            let created = session.engine.seed_default_hold_reasons()?;
            if output.is_json() {
                output.data(&serde_json::json!({ "created": created }));
            } else if created == 0 {
                output.success("Hold reasons already exist; nothing seeded");
            } else {
                output.success(&format!("Seeded {} hold reasons", created));
            }
        }
    }

    Ok(())
}

fn print_reason(session: &Session, verb: &str, reason: &HoldReason) {
    if session.output.is_json() {
        session.output.data(reason);
    } else {
        session
            .output
            .success(&format!("{}: {} - {}", verb, reason.id, reason.name));
    }
}
