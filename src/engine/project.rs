//! One project's live state and its read views

use serde::Serialize;

use crate::domain::{
    Dependency, HoldRegistry, ProjectId, Task, TaskGraph, TaskId, WorkingCalendar,
};
use crate::storage::ScheduleSettings;

/// A project's task graph plus the settings it schedules against
#[derive(Debug, Clone)]
pub struct ProjectSchedule {
    pub id: ProjectId,
    pub graph: TaskGraph,
    /// Effective settings: the project's override, or the workspace default
    pub settings: ScheduleSettings,
    /// True if `settings` comes from the project's own settings file
    pub has_override: bool,
}

impl ProjectSchedule {
    pub fn new(id: ProjectId, settings: ScheduleSettings) -> Self {
        Self {
            id,
            graph: TaskGraph::new(),
            settings,
            has_override: false,
        }
    }

    pub fn calendar(&self) -> &WorkingCalendar {
        &self.settings.calendar
    }

    /// Tasks in display order
    pub fn view(&self, holds: &HoldRegistry) -> GraphView {
        let mut tasks: Vec<TaskView> = self
            .graph
            .tasks()
            .map(|t| TaskView::of(t, &self.graph, holds))
            .collect();
        tasks.sort_by_key(|v| (v.task.task_number, v.task.id));

        GraphView {
            project: self.id.clone(),
            tasks,
            dependencies: self.graph.dependencies(),
        }
    }
}

/// A task as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub is_locked: bool,
    /// Name of the hold reason, if it still exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_reason_name: Option<String>,
    pub successor_ids: Vec<TaskId>,
}

impl TaskView {
    pub(crate) fn of(task: &Task, graph: &TaskGraph, holds: &HoldRegistry) -> Self {
        Self {
            task: task.clone(),
            is_locked: task.is_locked(),
            hold_reason_name: task
                .hold_reason_id
                .and_then(|id| holds.get(id).ok())
                .map(|r| r.name.clone()),
            successor_ids: graph
                .successors(task.id)
                .map(|s| s.into_iter().collect())
                .unwrap_or_default(),
        }
    }
}

/// Full task and edge dump for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphView {
    pub project: ProjectId,
    pub tasks: Vec<TaskView>,
    pub dependencies: Vec<Dependency>,
}
