//! Main CLI application structure

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use super::output::{Output, OutputFormat};
use super::{hold, rollover, schedule, settings, task, template};
use crate::domain::ProjectId;
use crate::engine::ScheduleEngine;
use crate::storage::{UserConfig, Workspace};

#[derive(Parser)]
#[command(name = "sm")]
#[command(author, version, about = "Construction schedule planner with cascading task dates")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the user config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project to operate on
    #[arg(long, short = 'p', global = true, env = "SM_PROJECT")]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new schedule workspace
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Show every task and dependency of a project
    Graph,

    /// Move a task, cascading to its successors
    Move(schedule::MoveArgs),

    /// Manage hold reasons
    #[command(subcommand)]
    Hold(hold::HoldCommands),

    /// Manage template rows
    #[command(subcommand)]
    Template(template::TemplateCommands),

    /// Show or change scheduling settings
    #[command(subcommand)]
    Settings(settings::SettingsCommands),

    /// Run the overdue-task sweep
    #[command(subcommand)]
    Rollover(rollover::RolloverCommands),
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project
    New {
        /// Project ID, a lowercase slug such as `smith-st`
        id: ProjectId,
    },

    /// List projects
    List,
}

/// Shared state for one command invocation
pub struct Session {
    pub engine: ScheduleEngine,
    pub output: Output,
    project_flag: Option<String>,
    user: UserConfig,
}

impl Session {
    fn open(output: Output, project_flag: Option<String>, user: UserConfig) -> Result<Self> {
        let workspace = Workspace::open_current()?;
        debug!(root = %workspace.root().display(), "Using workspace");
        let engine = ScheduleEngine::open(workspace)?;

        Ok(Self {
            engine,
            output,
            project_flag,
            user,
        })
    }

    /// The project named by `--project`, `SM_PROJECT` or the user config,
    /// or the only project in the workspace
    pub fn project(&self) -> Result<ProjectId> {
        if let Some(raw) = self
            .project_flag
            .as_deref()
            .or(self.user.default_project.as_deref())
        {
            return raw
                .parse::<ProjectId>()
                .with_context(|| format!("Invalid project '{}'", raw));
        }

        let projects = self.engine.list_projects()?;
        match projects.as_slice() {
            [only] => Ok(only.clone()),
            [] => anyhow::bail!("No projects yet. Run 'sm project new <id>' first."),
            _ => anyhow::bail!("Several projects exist; pick one with --project or SM_PROJECT"),
        }
    }

    /// Returns the explicitly selected project, if any
    pub fn explicit_project(&self) -> Result<Option<ProjectId>> {
        self.project_flag
            .as_deref()
            .map(|raw| {
                raw.parse::<ProjectId>()
                    .with_context(|| format!("Invalid project '{}'", raw))
            })
            .transpose()
    }
}

/// Main entry point for the CLI
pub fn run(cli: Cli) -> Result<()> {
    let user = UserConfig::load()?;
    let format = cli.format.unwrap_or_else(|| user.default_format.into());
    let output = Output::new(format);

    debug!("sm starting");

    if let Commands::Init { path } = &cli.command {
        let workspace = Workspace::init(path)?;
        debug!(dir = %workspace.sm_dir().display(), "Created workspace directory");
        output.success(&format!(
            "Initialized schedule workspace at {}",
            workspace.root().display()
        ));
        return Ok(());
    }

    let session = Session::open(output, cli.project, user)?;

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Project(cmd) => run_project(cmd, &session)?,
        Commands::Task(cmd) => task::run(cmd, &session)?,
        Commands::Graph => schedule::graph(&session)?,
        Commands::Move(args) => schedule::move_task(args, &session)?,
        Commands::Hold(cmd) => hold::run(cmd, &session)?,
        Commands::Template(cmd) => template::run(cmd, &session)?,
        Commands::Settings(cmd) => settings::run(cmd, &session)?,
        Commands::Rollover(cmd) => rollover::run(cmd, &session)?,
    }

    debug!("Command completed successfully");
    Ok(())
}

fn run_project(cmd: ProjectCommands, session: &Session) -> Result<()> {
    let output = &session.output;

    match cmd {
        ProjectCommands::New { id } => {
            session.engine.create_project(&id)?;
            if output.is_json() {
                output.data(&serde_json::json!({ "id": id }));
            } else {
                output.success(&format!("Created project: {}", id));
            }
        }
        ProjectCommands::List => {
            let projects = session.engine.list_projects()?;
            if output.is_json() {
                output.data(&projects);
            } else if projects.is_empty() {
                println!("No projects");
            } else {
                for id in projects {
                    println!("{}", id);
                }
            }
        }
    }

    Ok(())
}
