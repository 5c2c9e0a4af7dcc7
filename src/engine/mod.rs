//! Schedule engine
//!
//! The external interface of the scheduler. Every project is guarded by one
//! logical write lock: an in-process `RwLock` plus, when backed by a
//! workspace, an exclusive lock file so separate `sm` processes serialize too.
//! Reads share the in-process lock.
//!
//! Mutations follow one pattern: take the locks, reload the project from
//! disk, run the operation on a cloned draft, persist the draft, then swap it
//! in. Any error leaves both the live state and the files untouched.

mod project;
mod rollover;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::{
    commit, plan_move, resolve_move, sweep, CascadePlan, CommitReport, HoldChange, HoldReason,
    HoldReasonId, HoldReasonUpdate, HoldRegistry, MoveOutcome, NewHoldReason, NewTask, ProjectId,
    Result, RolloverReport, ScheduleError, Task, TaskGraph, TaskId, TaskUpdate, TemplateLibrary,
    TemplateRow, TemplateRowId, WorkingCalendar,
};
use crate::storage::{ConfigError, ProjectLock, ScheduleSettings, SettingsUpdate, Workspace};

pub use project::{GraphView, ProjectSchedule, TaskView};
pub use rollover::{next_run, today_in, RolloverJob};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Re-plans `task` at its current start so it and its successors satisfy
/// every dependency again
///
/// Fails with `TaskLocked` naming the first locked successor that would have
/// to move.
fn realign(graph: &mut TaskGraph, calendar: &WorkingCalendar, task: TaskId) -> Result<()> {
    let start = graph.task(task)?.start_date;
    let plan = plan_move(graph, calendar, task, start)?;
    if plan.is_empty() {
        return Ok(());
    }
    if let Some(blocked) = plan.locked_successors().next() {
        return Err(ScheduleError::TaskLocked {
            task: blocked.task_id,
            lock: blocked.lock_type,
        });
    }
    commit(graph, calendar, &plan, &BTreeSet::new())?;
    debug!(%task, moved = plan.entries.len(), "Realigned task after dependency change");
    Ok(())
}

/// Re-derives every task against `calendar`, predecessors first
///
/// Each task keeps its start rolled onto a working day and gets its end
/// recomputed; successors follow through the normal cascade. Fails with
/// `TaskLocked` if any locked task would change. Returns the number of date
/// changes made.
fn realign_all(graph: &mut TaskGraph, calendar: &WorkingCalendar) -> Result<usize> {
    let mut changed = 0;

    for task in graph.topological_order() {
        let start = graph.task(task)?.start_date;
        let plan = plan_move(graph, calendar, task, start)?;
        if plan.is_empty() {
            continue;
        }
        if let Some(blocked) = plan.entries.iter().find(|e| e.is_locked) {
            return Err(ScheduleError::TaskLocked {
                task: blocked.task_id,
                lock: blocked.lock_type,
            });
        }
        commit(graph, calendar, &plan, &BTreeSet::new())?;
        changed += plan.entries.len();
    }

    Ok(changed)
}

/// Adds a new task and realigns it behind its predecessors
fn insert_task(schedule: &mut ProjectSchedule, new: &NewTask) -> Result<Task> {
    let id = schedule.graph.next_task_id();
    let number = schedule.graph.next_task_number();
    let mut task = Task::scheduled(id, number, new, schedule.calendar())?;
    task.predecessor_ids = new.predecessor_ids.clone();

    schedule.graph.add_task(task)?;
    let calendar = schedule.settings.calendar.clone();
    realign(&mut schedule.graph, &calendar, id)?;
    Ok(schedule.graph.task(id)?.clone())
}

/// Scheduling engine over a workspace, or purely in memory
pub struct ScheduleEngine {
    workspace: Option<Workspace>,
    settings: RwLock<ScheduleSettings>,
    projects: RwLock<HashMap<ProjectId, Arc<RwLock<ProjectSchedule>>>>,
    holds: RwLock<HoldRegistry>,
    templates: RwLock<TemplateLibrary>,
}

impl ScheduleEngine {
    /// An engine with no persistence, starting empty
    pub fn in_memory(settings: ScheduleSettings) -> Self {
        Self {
            workspace: None,
            settings: RwLock::new(settings),
            projects: RwLock::new(HashMap::new()),
            holds: RwLock::new(HoldRegistry::new()),
            templates: RwLock::new(TemplateLibrary::default()),
        }
    }

    /// An engine backed by a workspace on disk
    pub fn open(workspace: Workspace) -> Result<Self> {
        let settings = workspace.settings()?;
        let mut holds = HoldRegistry::from_reasons(workspace.hold_store().read_all()?);
        holds.mark_issued(workspace.deleted_hold_store().read_all()?.iter().map(|r| r.id));
        let templates = TemplateLibrary::from_rows(workspace.template_store().read_all()?);

        debug!(
            root = %workspace.root().display(),
            holds = holds.len(),
            "Opened workspace"
        );

        Ok(Self {
            workspace: Some(workspace),
            settings: RwLock::new(settings),
            projects: RwLock::new(HashMap::new()),
            holds: RwLock::new(holds),
            templates: RwLock::new(templates),
        })
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    // Projects

    fn load_project(&self, workspace: &Workspace, id: &ProjectId) -> Result<ProjectSchedule> {
        if !workspace.project_exists(id) {
            return Err(ScheduleError::ProjectNotFound(id.clone()));
        }

        let (settings, has_override) = match workspace.project_settings(id)? {
            Some(own) => (own, true),
            None => (workspace.settings()?, false),
        };
        let mut graph = TaskGraph::from_tasks(workspace.task_store(id).read_all()?)?;
        graph.mark_issued(workspace.deleted_task_store(id).read_all()?.iter().map(|t| t.id));

        Ok(ProjectSchedule {
            id: id.clone(),
            graph,
            settings,
            has_override,
        })
    }

    fn project(&self, id: &ProjectId) -> Result<Arc<RwLock<ProjectSchedule>>> {
        if let Some(cell) = read(&self.projects).get(id) {
            return Ok(Arc::clone(cell));
        }

        let workspace = self
            .workspace
            .as_ref()
            .ok_or_else(|| ScheduleError::ProjectNotFound(id.clone()))?;
        let schedule = self.load_project(workspace, id)?;

        let mut projects = write(&self.projects);
        let cell = projects
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(schedule)));
        Ok(Arc::clone(cell))
    }

    /// Writes `draft` if its tasks differ from `live`, archiving removed tasks
    fn persist(&self, live: &ProjectSchedule, draft: &ProjectSchedule) -> Result<()> {
        let Some(workspace) = &self.workspace else {
            return Ok(());
        };
        if draft.graph.tasks().eq(live.graph.tasks()) {
            return Ok(());
        }

        let archive = workspace.deleted_task_store(&draft.id);
        for task in live.graph.tasks().filter(|t| !draft.graph.contains(t.id)) {
            archive.append(task)?;
        }
        workspace.task_store(&draft.id).write_all(draft.graph.tasks())?;
        Ok(())
    }

    /// Takes the project's file lock and reloads `live` from disk
    fn reload(&self, id: &ProjectId, live: &mut ProjectSchedule) -> Result<Option<ProjectLock>> {
        match &self.workspace {
            Some(workspace) => {
                let guard = workspace.lock_project(id)?;
                *live = self.load_project(workspace, id)?;
                Ok(Some(guard))
            }
            None => Ok(None),
        }
    }

    /// Runs `op` on a draft of the project under its write lock
    fn mutate<T>(
        &self,
        id: &ProjectId,
        op: impl FnOnce(&mut ProjectSchedule) -> Result<T>,
    ) -> Result<T> {
        let cell = self.project(id)?;
        let mut live = write(&cell);

        let _file_lock = self.reload(id, &mut live)?;

        let mut draft = live.clone();
        let value = op(&mut draft)?;

        self.persist(&live, &draft)?;
        *live = draft;
        Ok(value)
    }

    fn inspect<T>(&self, id: &ProjectId, op: impl FnOnce(&ProjectSchedule) -> Result<T>) -> Result<T> {
        let cell = self.project(id)?;
        let schedule = read(&cell);
        op(&schedule)
    }

    pub fn create_project(&self, id: &ProjectId) -> Result<()> {
        let exists = match &self.workspace {
            Some(workspace) => workspace.project_exists(id),
            None => read(&self.projects).contains_key(id),
        };
        if exists {
            return Err(ScheduleError::ProjectExists(id.clone()));
        }

        if let Some(workspace) = &self.workspace {
            workspace.create_project(id)?;
        }
        let schedule = ProjectSchedule::new(id.clone(), read(&self.settings).clone());
        write(&self.projects).insert(id.clone(), Arc::new(RwLock::new(schedule)));

        info!(project = %id, "Created project");
        Ok(())
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectId>> {
        match &self.workspace {
            Some(workspace) => Ok(workspace.list_projects()?),
            None => {
                let mut ids: Vec<_> = read(&self.projects).keys().cloned().collect();
                ids.sort();
                Ok(ids)
            }
        }
    }

    // Reads

    /// Full task and edge dump
    pub fn get_graph(&self, project: &ProjectId) -> Result<GraphView> {
        let holds = read(&self.holds);
        self.inspect(project, |s| Ok(s.view(&holds)))
    }

    pub fn get_task(&self, project: &ProjectId, task: TaskId) -> Result<TaskView> {
        let holds = read(&self.holds);
        self.inspect(project, |s| {
            Ok(TaskView::of(s.graph.task(task)?, &s.graph, &holds))
        })
    }

    /// Previews a move without writing anything
    pub fn plan_move(
        &self,
        project: &ProjectId,
        task: TaskId,
        requested_start: NaiveDate,
    ) -> Result<CascadePlan> {
        self.inspect(project, |s| {
            let plan = plan_move(&s.graph, s.calendar(), task, requested_start)?;
            debug!(%project, %task, entries = plan.entries.len(), "Planned move");
            Ok(plan)
        })
    }

    // Moves

    /// Moves a task, cascading to successors
    ///
    /// See [`resolve_move`] for how `confirmed` selects between returning a
    /// plan for confirmation and committing.
    pub fn move_task(
        &self,
        project: &ProjectId,
        task: TaskId,
        requested_start: NaiveDate,
        confirmed: Option<&BTreeSet<TaskId>>,
    ) -> Result<MoveOutcome> {
        self.mutate(project, |s| {
            let calendar = s.settings.calendar.clone();
            resolve_move(&mut s.graph, &calendar, task, requested_start, confirmed)
        })
    }

    /// Commits a plan obtained earlier from [`Self::plan_move`]
    pub fn commit_plan(
        &self,
        project: &ProjectId,
        plan: &CascadePlan,
        confirmed: &BTreeSet<TaskId>,
    ) -> Result<CommitReport> {
        self.mutate(project, |s| {
            let calendar = s.settings.calendar.clone();
            commit(&mut s.graph, &calendar, plan, confirmed)
        })
    }

    // Task edits

    /// Applies non-date field changes: name, hold, lock transition
    pub fn update_task(
        &self,
        project: &ProjectId,
        task: TaskId,
        update: TaskUpdate,
    ) -> Result<Task> {
        let holds = read(&self.holds);
        self.mutate(project, |s| {
            let graph = &mut s.graph;
            graph.task(task)?;

            if let Some(name) = &update.name {
                graph.rename_task(task, name)?;
            }
            match update.hold {
                Some(HoldChange::Place(reason)) => {
                    graph.place_on_hold(task, reason, &holds)?;
                }
                Some(HoldChange::Release) => {
                    graph.release_hold(task)?;
                }
                None => {}
            }
            if let Some(transition) = update.lock {
                graph.transition_lock(task, transition)?;
            }

            Ok(graph.task(task)?.clone())
        })
    }

    /// Replaces a task's predecessors and realigns its dates
    pub fn set_dependencies(
        &self,
        project: &ProjectId,
        task: TaskId,
        predecessors: &BTreeSet<TaskId>,
    ) -> Result<Task> {
        self.mutate(project, |s| {
            s.graph.set_predecessors(task, predecessors)?;
            let calendar = s.settings.calendar.clone();
            realign(&mut s.graph, &calendar, task)?;
            Ok(s.graph.task(task)?.clone())
        })
    }

    /// Creates an ad hoc task
    pub fn add_task(&self, project: &ProjectId, new: NewTask) -> Result<Task> {
        let task = self.mutate(project, |s| insert_task(s, &new))?;
        info!(%project, task = %task.id, "Added task");
        Ok(task)
    }

    /// Creates a task from a template row
    ///
    /// The task depends on every task already created from the row's
    /// predecessor rows. Without `start` it begins as soon as those allow;
    /// a row with no such predecessors needs an explicit start.
    pub fn create_from_template(
        &self,
        project: &ProjectId,
        row: TemplateRowId,
        start: Option<NaiveDate>,
    ) -> Result<Task> {
        let row = read(&self.templates).get(row)?.clone();

        let task = self.mutate(project, |s| {
            let predecessors: BTreeSet<TaskId> = s
                .graph
                .tasks()
                .filter(|t| {
                    t.template_row_id
                        .is_some_and(|r| row.predecessor_row_ids.contains(&r))
                })
                .map(|t| t.id)
                .collect();

            let start = match start {
                Some(date) => date,
                None => {
                    let mut earliest: Option<NaiveDate> = None;
                    for pred in &predecessors {
                        let bound = s.calendar().next_working_day(s.graph.task(*pred)?.end_date)?;
                        earliest = Some(earliest.map_or(bound, |e| e.max(bound)));
                    }
                    earliest.ok_or_else(|| {
                        ScheduleError::InvalidDate(format!(
                            "template row {} has no scheduled predecessors, a start date is required",
                            row.id
                        ))
                    })?
                }
            };

            let mut new = NewTask::new(row.name.clone(), start, row.duration_days).after(predecessors);
            new.template_row_id = Some(row.id);
            insert_task(s, &new)
        })?;

        info!(%project, task = %task.id, row = %row.id, "Created task from template");
        Ok(task)
    }

    /// Deletes an unlocked task and its edges
    pub fn delete_task(&self, project: &ProjectId, task: TaskId) -> Result<Task> {
        let removed = self.mutate(project, |s| s.graph.remove_task(task))?;
        info!(%project, %task, "Deleted task");
        Ok(removed)
    }

    // Hold reasons

    fn mutate_holds<T>(&self, op: impl FnOnce(&mut HoldRegistry) -> Result<T>) -> Result<T> {
        let mut live = write(&self.holds);
        let mut draft = live.clone();
        let value = op(&mut draft)?;

        if let Some(workspace) = &self.workspace {
            let archive = workspace.deleted_hold_store();
            for reason in live.iter().filter(|r| draft.get(r.id).is_err()) {
                archive.append(reason)?;
            }
            workspace.hold_store().write_all(draft.iter())?;
        }
        *live = draft;
        Ok(value)
    }

    pub fn list_hold_reasons(&self) -> Vec<HoldReason> {
        read(&self.holds).list().into_iter().cloned().collect()
    }

    pub fn create_hold_reason(&self, new: NewHoldReason) -> Result<HoldReason> {
        self.mutate_holds(|h| Ok(h.create(new)))
    }

    pub fn update_hold_reason(&self, id: HoldReasonId, update: HoldReasonUpdate) -> Result<HoldReason> {
        self.mutate_holds(|h| h.update(id, update))
    }

    /// Deletes a reason; held tasks keep pointing at it
    pub fn delete_hold_reason(&self, id: HoldReasonId) -> Result<HoldReason> {
        self.mutate_holds(|h| h.delete(id))
    }

    /// Returns the number of reasons created
    pub fn seed_default_hold_reasons(&self) -> Result<usize> {
        self.mutate_holds(|h| Ok(h.seed_defaults()))
    }

    // Templates

    pub fn list_templates(&self) -> Vec<TemplateRow> {
        read(&self.templates).list().into_iter().cloned().collect()
    }

    pub fn add_template_row(
        &self,
        name: &str,
        duration_days: u32,
        predecessor_rows: BTreeSet<TemplateRowId>,
    ) -> Result<TemplateRow> {
        let mut live = write(&self.templates);
        let mut draft = live.clone();
        let row = draft.add(name, duration_days, predecessor_rows)?;

        if let Some(workspace) = &self.workspace {
            workspace.template_store().write_all(draft.iter())?;
        }
        *live = draft;
        Ok(row)
    }

    // Settings

    /// Effective settings of a project, or the workspace settings
    pub fn get_settings(&self, project: Option<&ProjectId>) -> Result<ScheduleSettings> {
        match project {
            Some(id) => self.inspect(id, |s| Ok(s.settings.clone())),
            None => Ok(read(&self.settings).clone()),
        }
    }

    /// Changes settings of one project (creating its override) or of the
    /// workspace
    ///
    /// Every affected task is re-derived against the new calendar before
    /// anything is written. If that would change a locked task the update
    /// fails with `TaskLocked` and neither settings nor tasks change.
    pub fn update_settings(
        &self,
        project: Option<&ProjectId>,
        update: &SettingsUpdate,
    ) -> Result<ScheduleSettings> {
        let invalid = |e: ConfigError| ScheduleError::Storage(e.into());

        match project {
            Some(id) => {
                let cell = self.project(id)?;
                let mut live = write(&cell);
                let _file_lock = self.reload(id, &mut live)?;

                let mut draft = live.clone();
                update.apply(&mut draft.settings).map_err(invalid)?;
                draft.has_override = true;
                let calendar = draft.settings.calendar.clone();
                let changed = realign_all(&mut draft.graph, &calendar)?;

                self.persist(&live, &draft)?;
                if let Some(workspace) = &self.workspace {
                    draft.settings.save(&workspace.project_settings_path(id))?;
                }
                let settings = draft.settings.clone();
                *live = draft;

                info!(project = %id, changed, "Updated project settings");
                Ok(settings)
            }
            None => {
                let mut global = write(&self.settings);
                let mut settings = global.clone();
                update.apply(&mut settings).map_err(invalid)?;

                // Projects are locked in name order, after the workspace settings
                let cells = self
                    .list_projects()?
                    .into_iter()
                    .map(|id| -> Result<_> { Ok((self.project(&id)?, id)) })
                    .collect::<Result<Vec<_>>>()?;
                let mut held = Vec::with_capacity(cells.len());
                for (cell, id) in &cells {
                    let mut live = write(cell);
                    let file_lock = self.reload(id, &mut live)?;
                    held.push((live, file_lock));
                }

                let mut drafts = Vec::with_capacity(held.len());
                for (live, _) in &held {
                    if live.has_override {
                        drafts.push(None);
                        continue;
                    }
                    let mut draft = ProjectSchedule::clone(live);
                    draft.settings = settings.clone();
                    let changed = realign_all(&mut draft.graph, &settings.calendar)?;
                    debug!(project = %draft.id, changed, "Re-derived task dates");
                    drafts.push(Some(draft));
                }

                for ((live, _), draft) in held.iter().zip(&drafts) {
                    if let Some(draft) = draft {
                        self.persist(live, draft)?;
                    }
                }
                if let Some(workspace) = &self.workspace {
                    settings.save(&workspace.config_path())?;
                }

                *global = settings.clone();
                for ((live, _), draft) in held.iter_mut().zip(drafts) {
                    if let Some(draft) = draft {
                        **live = draft;
                    }
                }
                info!("Updated workspace settings");
                Ok(settings)
            }
        }
    }

    // Rollover

    /// Sweeps one project as of `today`
    pub fn run_rollover(&self, project: &ProjectId, today: NaiveDate) -> Result<RolloverReport> {
        self.mutate(project, |s| {
            let calendar = s.settings.calendar.clone();
            sweep(&mut s.graph, &calendar, today)
        })
    }
}
