//! Task graph store
//!
//! Holds every task of one project together with its predecessor edges and
//! answers graph queries. Edges are finish-to-start: the edge direction is
//! `predecessor -> task`. Uses petgraph for reachability and ordering; the
//! tasks' `predecessor_ids` sets are kept in step with the graph edges.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::Serialize;

use super::error::{Result, ScheduleError};
use super::hold::HoldRegistry;
use super::id::{HoldReasonId, TaskId};
use super::lock::{LockTransition, TaskEdit};
use super::task::Task;

/// A finish-to-start dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Dependency {
    pub predecessor_id: TaskId,
    pub successor_id: TaskId,
}

/// All tasks and dependencies of one project
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    /// Task records by id
    tasks: BTreeMap<TaskId, Task>,

    /// The underlying directed graph; indices survive node removal
    graph: StableDiGraph<TaskId, ()>,

    /// Map from TaskId to node index
    node_map: HashMap<TaskId, NodeIndex>,

    /// Highest id ever stored, removed tasks included
    last_issued: Option<TaskId>,
}

impl TaskGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from stored tasks, rejecting invalid records and cycles
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self> {
        let mut graph = Self::new();

        // First pass: add all nodes
        let tasks: Vec<_> = tasks.into_iter().collect();
        for task in &tasks {
            task.validate()
                .map_err(|e| ScheduleError::Storage(anyhow::anyhow!(e)))?;
            let mut bare = task.clone();
            bare.predecessor_ids.clear();
            graph.insert_node(bare);
        }

        // Second pass: add all edges
        for task in &tasks {
            for pred in &task.predecessor_ids {
                graph.add_dependency(task.id, *pred)?;
            }
        }

        Ok(graph)
    }

    fn insert_node(&mut self, task: Task) {
        let id = task.id;
        self.last_issued = self.last_issued.max(Some(id));
        if !self.node_map.contains_key(&id) {
            let idx = self.graph.add_node(id);
            self.node_map.insert(id, idx);
        }
        self.tasks.insert(id, task);
    }

    fn index(&self, id: TaskId) -> Result<NodeIndex> {
        self.node_map
            .get(&id)
            .copied()
            .ok_or(ScheduleError::TaskNotFound(id))
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Returns the number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the graph has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks up a task
    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(ScheduleError::TaskNotFound(id))
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or(ScheduleError::TaskNotFound(id))
    }

    /// Iterates tasks in id order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Returns the id a newly created task should get
    ///
    /// Ids of removed tasks are never reused.
    pub fn next_task_id(&self) -> TaskId {
        self.last_issued
            .map(|id| id.next())
            .unwrap_or(TaskId::new(1))
    }

    /// Records ids used by tasks that are no longer in the graph
    pub fn mark_issued(&mut self, ids: impl IntoIterator<Item = TaskId>) {
        self.last_issued = ids.into_iter().chain(self.last_issued).max();
    }

    /// Returns the display number a newly created task should get
    pub fn next_task_number(&self) -> u32 {
        self.tasks
            .values()
            .map(|t| t.task_number)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1)
    }

    /// Tasks whose predecessors contain `id`, in id order
    pub fn successors(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
        let idx = self.index(id)?;
        Ok(self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect())
    }

    /// Direct predecessors of `id`
    pub fn predecessors(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
        Ok(self.task(id)?.predecessor_ids.clone())
    }

    /// Every task reachable from `id` through successor edges, excluding `id`
    pub fn descendants(&self, id: TaskId) -> Result<BTreeSet<TaskId>> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for succ in self.successors(current)? {
                if seen.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }

        Ok(seen)
    }

    /// Adds a task; its predecessors must already exist
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        let predecessors = task.predecessor_ids.clone();
        let id = task.id;

        if let Some(missing) = predecessors.iter().find(|p| !self.contains(**p)) {
            return Err(ScheduleError::TaskNotFound(*missing));
        }
        if predecessors.contains(&id) {
            return Err(ScheduleError::SelfDependency(id));
        }

        let mut bare = task;
        bare.predecessor_ids.clear();
        self.insert_node(bare);

        for pred in predecessors {
            self.add_dependency(id, pred)?;
        }
        Ok(())
    }

    /// Removes an unlocked task and every edge touching it
    pub fn remove_task(&mut self, id: TaskId) -> Result<Task> {
        let task = self.task(id)?;
        if task.lock_type.forbids(TaskEdit::Delete) {
            return Err(ScheduleError::TaskLocked {
                task: id,
                lock: task.lock_type,
            });
        }

        for succ in self.successors(id)? {
            if let Some(s) = self.tasks.get_mut(&succ) {
                s.predecessor_ids.remove(&id);
                s.touch();
            }
        }

        let idx = self.index(id)?;
        self.graph.remove_node(idx);
        self.node_map.remove(&id);
        self.tasks.remove(&id).ok_or(ScheduleError::TaskNotFound(id))
    }

    /// Adds a dependency edge: `task` depends on `predecessor`
    ///
    /// Fails if the edge would close a cycle, i.e. if `predecessor` is
    /// already reachable from `task`. Adding an existing edge is a no-op.
    pub fn add_dependency(&mut self, task: TaskId, predecessor: TaskId) -> Result<()> {
        if task == predecessor {
            return Err(ScheduleError::SelfDependency(task));
        }

        let task_idx = self.index(task)?;
        let pred_idx = self.index(predecessor)?;

        if self.graph.find_edge(pred_idx, task_idx).is_some() {
            return Ok(());
        }

        if has_path_connecting(&self.graph, task_idx, pred_idx, None) {
            return Err(ScheduleError::CycleDetected { task, predecessor });
        }

        // Add edge: predecessor -> task
        self.graph.add_edge(pred_idx, task_idx, ());
        self.task_mut(task)?.predecessor_ids.insert(predecessor);
        Ok(())
    }

    /// Removes a dependency edge; returns false if it did not exist
    pub fn remove_dependency(&mut self, task: TaskId, predecessor: TaskId) -> bool {
        let (Some(task_idx), Some(pred_idx)) = (
            self.node_map.get(&task).copied(),
            self.node_map.get(&predecessor).copied(),
        ) else {
            return false;
        };

        match self.graph.find_edge(pred_idx, task_idx) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                if let Some(t) = self.tasks.get_mut(&task) {
                    t.predecessor_ids.remove(&predecessor);
                    t.touch();
                }
                true
            }
            None => false,
        }
    }

    /// Replaces the predecessor set of an unlocked task
    ///
    /// All-or-nothing: on any failure the graph is left unchanged.
    pub fn set_predecessors(&mut self, task: TaskId, predecessors: &BTreeSet<TaskId>) -> Result<()> {
        let current = self.task(task)?;
        if current.lock_type.forbids(TaskEdit::Dependencies) {
            return Err(ScheduleError::TaskLocked {
                task,
                lock: current.lock_type,
            });
        }

        let mut draft = self.clone();
        for old in current.predecessor_ids.difference(predecessors) {
            draft.remove_dependency(task, *old);
        }
        for new in predecessors {
            draft.add_dependency(task, *new)?;
        }

        draft.task_mut(task)?.touch();
        *self = draft;
        Ok(())
    }

    /// Renames a task unless its lock forbids it
    pub fn rename_task(&mut self, id: TaskId, name: &str) -> Result<&Task> {
        let task = self.task_mut(id)?;
        if task.lock_type.forbids(TaskEdit::Rename) {
            return Err(ScheduleError::TaskLocked {
                task: id,
                lock: task.lock_type,
            });
        }
        task.rename(name);
        Ok(task)
    }

    /// Places a task on hold for an active reason
    pub fn place_on_hold(
        &mut self,
        id: TaskId,
        reason: HoldReasonId,
        registry: &HoldRegistry,
    ) -> Result<&Task> {
        registry.require_active(reason)?;
        let task = self.task_mut(id)?;
        if task.lock_type.forbids(TaskEdit::Hold) {
            return Err(ScheduleError::TaskLocked {
                task: id,
                lock: task.lock_type,
            });
        }
        if task.status.is_complete() {
            return Err(ScheduleError::InvalidTransition {
                task: id,
                reason: "cannot hold a completed task".to_string(),
            });
        }
        task.place_on_hold(reason);
        Ok(task)
    }

    /// Releases a held task
    pub fn release_hold(&mut self, id: TaskId) -> Result<&Task> {
        let task = self.task_mut(id)?;
        if !task.release_hold() {
            return Err(ScheduleError::InvalidTransition {
                task: id,
                reason: "task is not on hold".to_string(),
            });
        }
        Ok(task)
    }

    /// Runs a lock transition through the state machine
    pub fn transition_lock(&mut self, id: TaskId, transition: LockTransition) -> Result<&Task> {
        let task = self.task_mut(id)?;
        let (lock, status) = transition
            .apply(task.lock_type, task.status)
            .map_err(|e| ScheduleError::InvalidTransition {
                task: id,
                reason: e.to_string(),
            })?;
        task.set_lock(lock, status);
        Ok(task)
    }

    /// Writes a date span; only the cascade commit calls this
    pub(crate) fn write_dates(
        &mut self,
        id: TaskId,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<()> {
        self.task_mut(id)?.set_dates(start, end);
        Ok(())
    }

    /// All edges, ordered by predecessor then successor
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut edges: Vec<_> = self
            .tasks
            .values()
            .flat_map(|t| {
                t.predecessor_ids.iter().map(move |p| Dependency {
                    predecessor_id: *p,
                    successor_id: t.id,
                })
            })
            .collect();
        edges.sort();
        edges
    }

    /// Edges touching any of `ids` where the successor starts before the
    /// predecessor ends
    pub fn overlapping_edges<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a TaskId>,
    ) -> Result<BTreeSet<Dependency>> {
        let mut violations = BTreeSet::new();

        for id in ids {
            let task = self.task(*id)?;
            for pred in &task.predecessor_ids {
                let p = self.task(*pred)?;
                if task.start_date < p.end_date {
                    violations.insert(Dependency {
                        predecessor_id: p.id,
                        successor_id: task.id,
                    });
                }
            }
            for succ in self.successors(*id)? {
                let s = self.task(succ)?;
                if s.start_date < task.end_date {
                    violations.insert(Dependency {
                        predecessor_id: task.id,
                        successor_id: s.id,
                    });
                }
            }
        }

        Ok(violations)
    }

    /// Tasks ordered so every predecessor comes before its successors
    pub fn topological_order(&self) -> Vec<TaskId> {
        match toposort(&self.graph, None) {
            Ok(order) => order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).copied())
                .collect(),
            // Unreachable while add_dependency rejects cycles
            Err(_) => self.tasks.keys().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::WorkingCalendar;
    use crate::domain::hold::NewHoldReason;
    use crate::domain::lock::LockType;
    use crate::domain::task::{NewTask, TaskStatus};
    use chrono::NaiveDate;

    fn make_task(seq: u64) -> Task {
        let start: NaiveDate = "2024-01-01".parse().unwrap();
        let new = NewTask::new(format!("Task {}", seq), start, 2);
        Task::scheduled(TaskId::new(seq), seq as u32, &new, &WorkingCalendar::default()).unwrap()
    }

    fn id(n: u64) -> TaskId {
        TaskId::new(n)
    }

    fn graph_with(n: u64) -> TaskGraph {
        let mut graph = TaskGraph::new();
        for i in 1..=n {
            graph.add_task(make_task(i)).unwrap();
        }
        graph
    }

    #[test]
    fn empty_graph() {
        let graph = TaskGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert_eq!(graph.next_task_id(), id(1));
        assert_eq!(graph.next_task_number(), 1);
    }

    #[test]
    fn add_dependency_updates_both_views() {
        let mut graph = graph_with(2);
        graph.add_dependency(id(2), id(1)).unwrap();

        assert_eq!(graph.predecessors(id(2)).unwrap(), BTreeSet::from([id(1)]));
        assert_eq!(graph.successors(id(1)).unwrap(), BTreeSet::from([id(2)]));
        assert_eq!(
            graph.dependencies(),
            vec![Dependency {
                predecessor_id: id(1),
                successor_id: id(2)
            }]
        );
    }

    #[test]
    fn cycle_detection_leaves_graph_unchanged() {
        let mut graph = graph_with(3);
        graph.add_dependency(id(2), id(1)).unwrap();
        graph.add_dependency(id(3), id(2)).unwrap();

        let before = graph.dependencies();
        let result = graph.add_dependency(id(1), id(3));

        assert!(matches!(result, Err(ScheduleError::CycleDetected { .. })));
        assert_eq!(graph.dependencies(), before);
        assert!(graph.predecessors(id(1)).unwrap().is_empty());
    }

    #[test]
    fn self_dependency_rejected() {
        let mut graph = graph_with(1);
        let result = graph.add_dependency(id(1), id(1));
        assert!(matches!(result, Err(ScheduleError::SelfDependency(_))));
    }

    #[test]
    fn unknown_task_returns_error() {
        let mut graph = graph_with(1);
        let result = graph.add_dependency(id(1), id(2));
        assert!(matches!(result, Err(ScheduleError::TaskNotFound(_))));
    }

    #[test]
    fn duplicate_edge_is_noop() {
        let mut graph = graph_with(2);
        graph.add_dependency(id(2), id(1)).unwrap();
        graph.add_dependency(id(2), id(1)).unwrap();
        assert_eq!(graph.dependencies().len(), 1);
    }

    #[test]
    fn remove_task_drops_edges() {
        let mut graph = graph_with(3);
        graph.add_dependency(id(2), id(1)).unwrap();
        graph.add_dependency(id(3), id(2)).unwrap();

        graph.remove_task(id(2)).unwrap();

        assert!(!graph.contains(id(2)));
        assert!(graph.predecessors(id(3)).unwrap().is_empty());
        assert!(graph.successors(id(1)).unwrap().is_empty());
        // Indices stay valid for the remaining nodes
        graph.add_dependency(id(3), id(1)).unwrap();
        assert_eq!(graph.successors(id(1)).unwrap(), BTreeSet::from([id(3)]));
    }

    #[test]
    fn remove_locked_task_fails() {
        let mut graph = graph_with(1);
        graph.transition_lock(id(1), LockTransition::Confirm).unwrap();

        let result = graph.remove_task(id(1));
        assert!(matches!(
            result,
            Err(ScheduleError::TaskLocked {
                lock: LockType::Confirm,
                ..
            })
        ));
        assert!(graph.contains(id(1)));
    }

    #[test]
    fn remove_dependency() {
        let mut graph = graph_with(2);
        graph.add_dependency(id(2), id(1)).unwrap();

        assert!(graph.remove_dependency(id(2), id(1)));
        assert!(!graph.remove_dependency(id(2), id(1)));
        assert!(graph.predecessors(id(2)).unwrap().is_empty());
    }

    #[test]
    fn set_predecessors_replaces_set() {
        let mut graph = graph_with(4);
        graph.add_dependency(id(4), id(1)).unwrap();

        graph
            .set_predecessors(id(4), &BTreeSet::from([id(2), id(3)]))
            .unwrap();

        assert_eq!(
            graph.predecessors(id(4)).unwrap(),
            BTreeSet::from([id(2), id(3)])
        );
        assert!(graph.successors(id(1)).unwrap().is_empty());
    }

    #[test]
    fn set_predecessors_is_atomic_on_cycle() {
        let mut graph = graph_with(3);
        graph.add_dependency(id(2), id(1)).unwrap();
        graph.add_dependency(id(3), id(2)).unwrap();

        let result = graph.set_predecessors(id(1), &BTreeSet::from([id(3)]));
        assert!(matches!(result, Err(ScheduleError::CycleDetected { .. })));
        assert!(graph.predecessors(id(1)).unwrap().is_empty());
        assert_eq!(graph.dependencies().len(), 2);
    }

    #[test]
    fn set_predecessors_on_locked_task_fails() {
        let mut graph = graph_with(2);
        graph.transition_lock(id(2), LockTransition::Start).unwrap();

        let result = graph.set_predecessors(id(2), &BTreeSet::from([id(1)]));
        assert!(matches!(result, Err(ScheduleError::TaskLocked { .. })));
    }

    #[test]
    fn descendants_are_transitive() {
        let mut graph = graph_with(4);
        graph.add_dependency(id(2), id(1)).unwrap();
        graph.add_dependency(id(3), id(2)).unwrap();

        assert_eq!(graph.descendants(id(1)).unwrap(), BTreeSet::from([id(2), id(3)]));
        assert!(graph.descendants(id(4)).unwrap().is_empty());
    }

    #[test]
    fn topological_order() {
        let mut graph = graph_with(3);
        graph.add_dependency(id(1), id(2)).unwrap();
        graph.add_dependency(id(2), id(3)).unwrap();

        let order = graph.topological_order();
        let pos = |n| order.iter().position(|x| *x == id(n)).unwrap();
        assert!(pos(3) < pos(2));
        assert!(pos(2) < pos(1));
    }

    #[test]
    fn from_tasks_rejects_cycles() {
        let mut a = make_task(1);
        let mut b = make_task(2);
        a.predecessor_ids.insert(id(2));
        b.predecessor_ids.insert(id(1));

        let result = TaskGraph::from_tasks([a, b]);
        assert!(matches!(result, Err(ScheduleError::CycleDetected { .. })));
    }

    #[test]
    fn from_tasks_rejects_dangling_predecessor() {
        let mut a = make_task(1);
        a.predecessor_ids.insert(id(9));
        assert!(matches!(
            TaskGraph::from_tasks([a]),
            Err(ScheduleError::TaskNotFound(_))
        ));
    }

    #[test]
    fn hold_respects_registry_and_lock() {
        let mut graph = graph_with(1);
        let mut registry = HoldRegistry::new();
        let reason = registry.create(NewHoldReason::named("Rain"));

        let task = graph.place_on_hold(id(1), reason.id, &registry).unwrap();
        assert!(task.is_on_hold());

        let unknown = graph.place_on_hold(id(1), HoldReasonId::new(99), &registry);
        assert!(matches!(unknown, Err(ScheduleError::HoldReasonNotFound(_))));

        let task = graph.release_hold(id(1)).unwrap();
        assert_eq!(task.status, TaskStatus::NotStarted);
    }

    #[test]
    fn rename_blocked_by_completed_lock() {
        let mut graph = graph_with(1);
        graph.transition_lock(id(1), LockTransition::Start).unwrap();
        graph.rename_task(id(1), "Still editable").unwrap();
        graph.transition_lock(id(1), LockTransition::Complete).unwrap();

        let result = graph.rename_task(id(1), "Too late");
        assert!(matches!(result, Err(ScheduleError::TaskLocked { .. })));
        assert_eq!(graph.task(id(1)).unwrap().name, "Still editable");
    }

    #[test]
    fn overlapping_edges_reports_violations() {
        let mut graph = graph_with(2);
        graph.add_dependency(id(2), id(1)).unwrap();

        // Both start 2024-01-01 and last two days, so 2 starts before 1 ends
        let found = graph.overlapping_edges([id(2)].iter()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn removed_task_id_is_not_reused() {
        let mut graph = graph_with(3);
        graph.remove_task(id(3)).unwrap();
        assert_eq!(graph.next_task_id(), id(4));

        let mut reloaded = TaskGraph::from_tasks(graph.tasks().cloned()).unwrap();
        assert_eq!(reloaded.next_task_id(), id(3));
        reloaded.mark_issued([id(3)]);
        assert_eq!(reloaded.next_task_id(), id(4));
    }

    #[test]
    fn performance_500_tasks() {
        use std::time::Instant;

        let mut graph = graph_with(500);
        for i in 2..=500 {
            graph.add_dependency(id(i), id(i - 1)).unwrap();
        }

        let start = Instant::now();
        let descendants = graph.descendants(id(1)).unwrap();
        let duration = start.elapsed();

        assert_eq!(descendants.len(), 499);
        assert!(duration.as_millis() < 100, "Descendants query took {:?}", duration);
    }
}
