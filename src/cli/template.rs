//! Template row commands

use anyhow::Result;
use clap::Subcommand;

use super::app::Session;
use crate::domain::TemplateRowId;

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List template rows in order
    List,

    /// Append a template row
    Add {
        /// Row name
        name: String,

        /// Duration in working days
        #[arg(long, default_value = "1")]
        days: u32,

        /// Earlier rows this row follows, comma separated
        #[arg(long, value_delimiter = ',')]
        after: Vec<TemplateRowId>,
    },
}

pub fn run(cmd: TemplateCommands, session: &Session) -> Result<()> {
    let output = &session.output;

    match cmd {
        TemplateCommands::List => {
            let rows = session.engine.list_templates();
            if output.is_json() {
                output.data(&rows);
            } else if rows.is_empty() {
                println!("No template rows");
            } else {
                println!("{:<4} {:>4} {:<12} NAME", "ID", "DAYS", "AFTER");
                println!("{}", "-".repeat(50));
                for row in &rows {
                    let after = row
                        .predecessor_row_ids
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    println!(
                        "{:<4} {:>4} {:<12} {}",
                        row.id, row.duration_days, after, row.name
                    );
                }
            }
        }
        TemplateCommands::Add { name, days, after } => {
            let row = session
                .engine
                .add_template_row(&name, days, after.into_iter().collect())?;
            if output.is_json() {
                output.data(&row);
            } else {
                output.success(&format!("Added template row: {} - {}", row.id, row.name));
            }
        }
    }

    Ok(())
}
