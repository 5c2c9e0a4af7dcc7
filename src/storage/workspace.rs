//! Workspace management
//!
//! Handles workspace initialization and provides access to stores.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use thiserror::Error;

use super::config::{find_workspace_root, ScheduleSettings, WORKSPACE_DIR};
use super::jsonl::JsonlStore;
use crate::domain::{HoldReason, ProjectId, Task, TemplateRow};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not in a schedule workspace. Run 'sm init' first.")]
    NotInWorkspace,
}

/// Exclusive write lock on one project, released on drop
#[derive(Debug)]
pub struct ProjectLock {
    _file: File,
}

/// A Schedule Master workspace rooted at the directory holding `.sm/`
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Opens an existing workspace at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(WORKSPACE_DIR).is_dir() {
            return Err(WorkspaceError::NotInWorkspace.into());
        }

        Ok(Self { root })
    }

    /// Opens the workspace at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let root = find_workspace_root(&cwd).ok_or(WorkspaceError::NotInWorkspace)?;

        Self::open(root)
    }

    /// Initializes a new workspace at the given path
    ///
    /// Safe to run twice: existing files are left alone.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let sm_dir = root.join(WORKSPACE_DIR);

        let projects_dir = sm_dir.join("projects");
        fs::create_dir_all(&projects_dir).with_context(|| {
            format!(
                "Failed to create projects directory: {}",
                projects_dir.display()
            )
        })?;

        let config_path = sm_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# Schedule Master settings

# Days work happens on
working_days = ["mon", "tue", "wed", "thu", "fri"]

# Dates never worked, e.g. "2024-12-25"
holidays = []

[rollover]
# Move overdue, not-started tasks to today once a day
enabled = true
time = "00:00"
timezone = "Australia/Sydney"
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = sm_dir.join(".gitignore");
        if !gitignore_path.exists() {
            let gitignore = r#"# Lock files are per machine
projects/*/.lock
*.tmp
"#;
            fs::write(&gitignore_path, gitignore).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .sm directory path
    pub fn sm_dir(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.sm_dir().join("config.toml")
    }

    /// Workspace-wide settings, or defaults when the file is missing
    pub fn settings(&self) -> Result<ScheduleSettings> {
        Ok(ScheduleSettings::load(&self.config_path())?.unwrap_or_default())
    }

    pub fn hold_store(&self) -> JsonlStore<HoldReason> {
        JsonlStore::new(self.sm_dir().join("hold_reasons.jsonl"))
    }

    /// Deleted hold reasons, kept so their ids are never reissued
    pub fn deleted_hold_store(&self) -> JsonlStore<HoldReason> {
        JsonlStore::new(self.sm_dir().join("hold_reasons.deleted.jsonl"))
    }

    pub fn template_store(&self) -> JsonlStore<TemplateRow> {
        JsonlStore::new(self.sm_dir().join("templates.jsonl"))
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.sm_dir().join("projects")
    }

    pub fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.projects_dir().join(project.as_str())
    }

    pub fn project_exists(&self, project: &ProjectId) -> bool {
        self.project_dir(project).is_dir()
    }

    /// Creates an empty project directory
    pub fn create_project(&self, project: &ProjectId) -> Result<()> {
        let dir = self.project_dir(project);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create project directory: {}", dir.display()))
    }

    /// Lists projects by directory name; entries that are not valid ids are skipped
    pub fn list_projects(&self) -> Result<Vec<ProjectId>> {
        let dir = self.projects_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut projects = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read projects directory: {}", dir.display()))?
        {
            let entry = entry.context("Failed to read project entry")?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ProjectId>().ok())
            {
                projects.push(id);
            }
        }

        projects.sort();
        Ok(projects)
    }

    pub fn task_store(&self, project: &ProjectId) -> JsonlStore<Task> {
        JsonlStore::new(self.project_dir(project).join("tasks.jsonl"))
    }

    /// Deleted tasks of a project, kept so their ids are never reissued
    pub fn deleted_task_store(&self, project: &ProjectId) -> JsonlStore<Task> {
        JsonlStore::new(self.project_dir(project).join("tasks.deleted.jsonl"))
    }

    pub fn project_settings_path(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join("settings.toml")
    }

    /// Project override settings, if the project has any
    pub fn project_settings(&self, project: &ProjectId) -> Result<Option<ScheduleSettings>> {
        ScheduleSettings::load(&self.project_settings_path(project))
    }

    /// Takes the project's exclusive write lock, blocking until it is free
    pub fn lock_project(&self, project: &ProjectId) -> Result<ProjectLock> {
        let path = self.project_dir(project).join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock project {}", project))?;

        Ok(ProjectLock { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(id: &str) -> ProjectId {
        id.parse().unwrap()
    }

    #[test]
    fn init_creates_structure() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();

        assert!(workspace.sm_dir().is_dir());
        assert!(workspace.projects_dir().is_dir());
        assert!(workspace.config_path().is_file());
        assert!(workspace.sm_dir().join(".gitignore").is_file());
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();

        Workspace::init(dir.path()).unwrap();
        Workspace::init(dir.path()).unwrap();

        assert!(dir.path().join(WORKSPACE_DIR).is_dir());
    }

    #[test]
    fn default_config_parses() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();

        assert_eq!(workspace.settings().unwrap(), ScheduleSettings::default());
    }

    #[test]
    fn open_non_workspace_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Workspace::open(dir.path()).is_err());
    }

    #[test]
    fn projects_are_listed_sorted() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();

        workspace.create_project(&project("smith-st")).unwrap();
        workspace.create_project(&project("acme-reno")).unwrap();
        fs::create_dir_all(workspace.projects_dir().join("Not Valid")).unwrap();

        let projects = workspace.list_projects().unwrap();
        assert_eq!(projects, vec![project("acme-reno"), project("smith-st")]);
        assert!(workspace.project_exists(&project("acme-reno")));
    }

    #[test]
    fn project_lock_can_be_retaken_after_drop() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();
        let id = project("acme");
        workspace.create_project(&id).unwrap();

        drop(workspace.lock_project(&id).unwrap());
        workspace.lock_project(&id).unwrap();
    }

    #[test]
    fn stores_are_scoped_to_project() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();
        let id = project("acme");

        let store = workspace.task_store(&id);
        assert!(store.path().starts_with(workspace.project_dir(&id)));
        assert!(store.path().ends_with("tasks.jsonl"));
    }
}
