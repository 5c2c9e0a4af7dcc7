//! # Command-Line Interface
//!
//! User-facing `sm` commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Workspace and projects | `init`, `project new`, `project list` |
//! | Task | Task lifecycle | `task add`, `task deps`, `task confirm`, `task hold` |
//! | Schedule | Dates and cascades | `graph`, `move 4 2024-03-11 --preview` |
//! | Reference | Shared lists | `hold list`, `hold seed`, `template add` |
//! | Settings | Calendar and rollover | `settings show`, `settings set --add-holiday` |
//! | Rollover | Overdue sweep | `rollover run`, `rollover watch` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! The default can be changed with `default_format` in the user config.
//!
//! ## Project Selection
//!
//! `--project`, then `SM_PROJECT`, then `default_project` from the user
//! config; a workspace with a single project needs none of them.
//!
//! ## Entry Point
//!
//! Call [`run()`] to execute a parsed [`Cli`].

mod app;
mod hold;
mod output;
mod rollover;
mod schedule;
mod settings;
mod task;
mod template;

pub use app::{run, Cli, Commands, Session};
pub use output::{Output, OutputFormat};
