//! # Storage Layer
//!
//! Persistence layer for Schedule Master with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Tasks | JSONL (one JSON per line) | `.sm/projects/{id}/tasks.jsonl` |
//! | Project settings | TOML (optional) | `.sm/projects/{id}/settings.toml` |
//! | Deleted tasks | JSONL (append only) | `.sm/projects/{id}/tasks.deleted.jsonl` |
//! | Hold reasons | JSONL | `.sm/hold_reasons.jsonl` |
//! | Deleted hold reasons | JSONL (append only) | `.sm/hold_reasons.deleted.jsonl` |
//! | Template rows | JSONL | `.sm/templates.jsonl` |
//! | Settings | TOML | `.sm/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`JsonlStore`] uses file locking (`fs2`) for concurrent access
//! - Each project has a `.lock` file taken for the whole of a write
//! - All writes are atomic (temp file + rename)
//!
//! ## Workspace Structure
//!
//! ```text
//! .sm/
//! ├── projects/
//! │   └── smith-st/
//! │       ├── tasks.jsonl     # Task snapshot, edges included
//! │       ├── tasks.deleted.jsonl
//! │       ├── settings.toml   # Optional override of config.toml
//! │       └── .lock           # Project write lock
//! ├── hold_reasons.jsonl
//! ├── hold_reasons.deleted.jsonl
//! ├── templates.jsonl
//! ├── config.toml             # Workspace settings
//! └── .gitignore
//! ```

mod config;
mod jsonl;
mod workspace;

pub use config::{
    find_workspace_root, parse_time, parse_timezone, ConfigError, OutputFormat, RolloverSettings,
    ScheduleSettings, SettingsUpdate, UserConfig, WORKSPACE_DIR,
};
pub use jsonl::{JsonlStore, Record};
pub use workspace::{ProjectLock, Workspace, WorkspaceError};
