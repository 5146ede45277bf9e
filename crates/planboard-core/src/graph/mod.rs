//! In-memory task graph for one project.
//!
//! Holds tasks, their direct dependency edges (both directions), and the
//! project's milestones. Every edge insertion re-runs cycle detection over
//! the whole graph before anything is mutated, so a `TaskGraph` is acyclic
//! at every observable point.
//!
//! Readers work on their own snapshot (`BoardService` loads a fresh graph
//! per request); the only interior mutability is the transitive-closure
//! memo, which sits behind a mutex and is cleared on every edge change.

pub mod cycle;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use planboard_db::models::{BlockedReason, Milestone, Task, TaskDependency, TaskStatus};

use crate::error::{PlanboardError, Result};

pub use cycle::find_cycle;

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// A task's status, with the blocked reason folded in so that
/// `blocked(dependency)` and `blocked(manual)` are distinct states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    #[default]
    Todo,
    Doing,
    Done,
    Blocked(BlockedReason),
}

impl TaskState {
    /// The board column this state is displayed in.
    pub fn column(self) -> TaskStatus {
        match self {
            Self::Todo => TaskStatus::Todo,
            Self::Doing => TaskStatus::Doing,
            Self::Done => TaskStatus::Done,
            Self::Blocked(_) => TaskStatus::Blocked,
        }
    }

    pub fn blocked_reason(self) -> Option<BlockedReason> {
        match self {
            Self::Blocked(reason) => Some(reason),
            _ => None,
        }
    }

    /// Rebuild a state from its stored columns. A `blocked` row without a
    /// reason is read as dependency-blocked, since that label is recomputed
    /// on the next transition anyway.
    pub fn from_parts(status: TaskStatus, reason: Option<BlockedReason>) -> Self {
        match status {
            TaskStatus::Todo => Self::Todo,
            TaskStatus::Doing => Self::Doing,
            TaskStatus::Done => Self::Done,
            TaskStatus::Blocked => Self::Blocked(reason.unwrap_or(BlockedReason::Dependency)),
        }
    }

    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked(reason) => write!(f, "blocked({reason})"),
            other => write!(f, "{}", other.column()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TaskStateRepr {
    status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blocked_reason: Option<BlockedReason>,
}

impl Serialize for TaskState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        TaskStateRepr {
            status: self.column(),
            blocked_reason: self.blocked_reason(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = TaskStateRepr::deserialize(deserializer)?;
        if repr.status != TaskStatus::Blocked && repr.blocked_reason.is_some() {
            return Err(serde::de::Error::custom(
                "blocked_reason is only valid with status \"blocked\"",
            ));
        }
        // A user asking for `blocked` without a reason means a manual block.
        Ok(match repr.status {
            TaskStatus::Blocked => {
                Self::Blocked(repr.blocked_reason.unwrap_or(BlockedReason::Manual))
            }
            status => Self::from_parts(status, None),
        })
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A task as held by the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskNode {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub effort_hours: f64,
    #[serde(flatten)]
    pub state: TaskState,
    pub order_index: i64,
    pub milestone_position: i32,
    pub created_at: DateTime<Utc>,
}

impl TaskNode {
    /// A fresh `todo` node. Rank and milestone position are assigned when
    /// the node is inserted into a graph.
    pub fn new(project_id: Uuid, title: impl Into<String>, effort_hours: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            milestone_id: None,
            title: title.into(),
            description: None,
            effort_hours,
            state: TaskState::Todo,
            order_index: 0,
            milestone_position: 0,
            created_at: Utc::now(),
        }
    }

    /// Stable board ordering key: rank, then creation time, then id.
    fn sort_key(&self) -> (i64, DateTime<Utc>, Uuid) {
        (self.order_index, self.created_at, self.id)
    }
}

impl From<Task> for TaskNode {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            project_id: t.project_id,
            milestone_id: t.milestone_id,
            title: t.title,
            description: t.description,
            effort_hours: t.effort_hours,
            state: TaskState::from_parts(t.status, t.blocked_reason),
            order_index: t.order_index,
            milestone_position: t.milestone_position,
            created_at: t.created_at,
        }
    }
}

/// A milestone with its member tasks in plan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneNode {
    pub id: Uuid,
    pub name: String,
    pub summary: Option<String>,
    pub position: i32,
    pub task_ids: Vec<Uuid>,
}

/// The persisted part of a task that graph mutations may change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskPatch {
    pub task_id: Uuid,
    pub state: TaskState,
    pub order_index: i64,
}

// ---------------------------------------------------------------------------
// TaskGraph
// ---------------------------------------------------------------------------

/// Tasks, dependency edges, and milestones of a single project.
///
/// An edge `a -> b` means `a` depends on `b`: `b` must be done before `a`
/// can be done.
#[derive(Debug)]
pub struct TaskGraph {
    project_id: Uuid,
    tasks: HashMap<Uuid, TaskNode>,
    deps: HashMap<Uuid, BTreeSet<Uuid>>,
    dependents: HashMap<Uuid, BTreeSet<Uuid>>,
    milestones: Vec<MilestoneNode>,
    closure_cache: Mutex<HashMap<Uuid, BTreeSet<Uuid>>>,
}

impl Clone for TaskGraph {
    fn clone(&self) -> Self {
        Self {
            project_id: self.project_id,
            tasks: self.tasks.clone(),
            deps: self.deps.clone(),
            dependents: self.dependents.clone(),
            milestones: self.milestones.clone(),
            closure_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl TaskGraph {
    pub fn new(project_id: Uuid) -> Self {
        Self {
            project_id,
            tasks: HashMap::new(),
            deps: HashMap::new(),
            dependents: HashMap::new(),
            milestones: Vec::new(),
            closure_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a graph from stored rows.
    ///
    /// Fails if an edge leaves the project or the stored edges contain a
    /// cycle; either means the store was written by something other than
    /// this crate.
    pub fn from_rows(
        project_id: Uuid,
        milestones: Vec<Milestone>,
        tasks: Vec<Task>,
        edges: Vec<TaskDependency>,
    ) -> Result<Self> {
        let mut graph = Self::new(project_id);

        for task in tasks {
            if task.project_id != project_id {
                return Err(PlanboardError::InvalidRequest(format!(
                    "task {} belongs to project {}, not {project_id}",
                    task.id, task.project_id
                )));
            }
            graph.tasks.insert(task.id, TaskNode::from(task));
        }

        for edge in edges {
            if !graph.tasks.contains_key(&edge.task_id) || !graph.tasks.contains_key(&edge.depends_on)
            {
                return Err(PlanboardError::InvalidRequest(format!(
                    "dependency {} -> {} crosses project {project_id}",
                    edge.task_id, edge.depends_on
                )));
            }
            graph.link(edge.task_id, edge.depends_on);
        }

        if let Some(cycle) = find_cycle(&graph.adjacency()) {
            return Err(PlanboardError::CyclicDependency { cycle });
        }

        let mut milestones = milestones;
        milestones.sort_by_key(|m| m.position);
        graph.milestones = milestones
            .into_iter()
            .map(|m| MilestoneNode {
                id: m.id,
                name: m.name,
                summary: m.summary,
                position: m.position,
                task_ids: Vec::new(),
            })
            .collect();

        let mut members: Vec<&TaskNode> = graph
            .tasks
            .values()
            .filter(|t| t.milestone_id.is_some())
            .collect();
        members.sort_by_key(|t| (t.milestone_position, t.created_at, t.id));
        let assignments: Vec<(Uuid, Uuid)> = members
            .iter()
            .filter_map(|t| t.milestone_id.map(|m| (m, t.id)))
            .collect();
        for (milestone_id, task_id) in assignments {
            if let Some(m) = graph.milestones.iter_mut().find(|m| m.id == milestone_id) {
                m.task_ids.push(task_id);
            }
        }

        Ok(graph)
    }

    // -- accessors ----------------------------------------------------------

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn task(&self, id: Uuid) -> Option<&TaskNode> {
        self.tasks.get(&id)
    }

    pub fn get(&self, id: Uuid) -> Result<&TaskNode> {
        self.tasks
            .get(&id)
            .ok_or_else(|| PlanboardError::task_not_found(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn milestones(&self) -> &[MilestoneNode] {
        &self.milestones
    }

    /// Every edge as `(task, depends_on)`, sorted.
    pub fn edges(&self) -> Vec<(Uuid, Uuid)> {
        let mut edges: Vec<(Uuid, Uuid)> = self
            .deps
            .iter()
            .flat_map(|(&t, ds)| ds.iter().map(move |&d| (t, d)))
            .collect();
        edges.sort();
        edges
    }

    // -- dependency queries -------------------------------------------------

    /// Direct dependencies of a task.
    pub fn dependencies_of(&self, id: Uuid) -> Result<BTreeSet<Uuid>> {
        self.get(id)?;
        Ok(self.deps.get(&id).cloned().unwrap_or_default())
    }

    /// Tasks that depend directly on `id`.
    pub fn dependents_of(&self, id: Uuid) -> Result<BTreeSet<Uuid>> {
        self.get(id)?;
        Ok(self.dependents.get(&id).cloned().unwrap_or_default())
    }

    /// Every task `id` depends on, directly or through other tasks.
    /// Memoized until the next edge change.
    pub fn transitive_dependencies_of(&self, id: Uuid) -> Result<BTreeSet<Uuid>> {
        self.get(id)?;
        let mut cache = self
            .closure_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(&id) {
            return Ok(hit.clone());
        }
        let closure = self.reachable(id, &self.deps);
        cache.insert(id, closure.clone());
        Ok(closure)
    }

    /// Every task that depends on `id`, directly or through other tasks.
    pub fn transitive_dependents_of(&self, id: Uuid) -> Result<BTreeSet<Uuid>> {
        self.get(id)?;
        Ok(self.reachable(id, &self.dependents))
    }

    /// Direct dependencies that are not done.
    pub fn unmet_dependencies(&self, id: Uuid) -> Vec<Uuid> {
        self.deps
            .get(&id)
            .into_iter()
            .flatten()
            .copied()
            .filter(|d| !self.tasks.get(d).is_some_and(|t| t.state.is_done()))
            .collect()
    }

    pub fn has_unmet_dependencies(&self, id: Uuid) -> bool {
        !self.unmet_dependencies(id).is_empty()
    }

    /// Tasks in `todo` whose every dependency is done, in board order.
    pub fn ready_tasks(&self) -> Vec<Uuid> {
        let mut ready: Vec<&TaskNode> = self
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Todo && !self.has_unmet_dependencies(t.id))
            .collect();
        ready.sort_by_key(|t| t.sort_key());
        ready.into_iter().map(|t| t.id).collect()
    }

    /// True when the task is neither done nor in progress and at least one
    /// dependency is not done, or when a user has blocked it by hand.
    pub fn is_blocked(&self, id: Uuid) -> Result<bool> {
        let node = self.get(id)?;
        Ok(match node.state {
            TaskState::Blocked(BlockedReason::Manual) => true,
            TaskState::Done | TaskState::Doing => false,
            TaskState::Todo | TaskState::Blocked(BlockedReason::Dependency) => {
                self.has_unmet_dependencies(id)
            }
        })
    }

    /// Blocked tasks in board order.
    pub fn blocked_tasks(&self) -> Vec<Uuid> {
        let mut blocked: Vec<&TaskNode> = self
            .tasks
            .values()
            .filter(|t| self.is_blocked(t.id).unwrap_or(false))
            .collect();
        blocked.sort_by_key(|t| t.sort_key());
        blocked.into_iter().map(|t| t.id).collect()
    }

    /// Done tasks that have some dependency, direct or transitive, that is
    /// no longer done. This happens only after a dependency is reopened.
    pub fn needs_review(&self) -> Vec<Uuid> {
        let mut flagged: Vec<&TaskNode> = self
            .tasks
            .values()
            .filter(|t| t.state.is_done())
            .filter(|t| {
                self.reachable(t.id, &self.deps)
                    .iter()
                    .any(|d| !self.tasks.get(d).is_some_and(|n| n.state.is_done()))
            })
            .collect();
        flagged.sort_by_key(|t| t.sort_key());
        flagged.into_iter().map(|t| t.id).collect()
    }

    // -- board columns ------------------------------------------------------

    /// Tasks in one column, in board order.
    pub fn column(&self, status: TaskStatus) -> Vec<&TaskNode> {
        let mut col: Vec<&TaskNode> = self
            .tasks
            .values()
            .filter(|t| t.state.column() == status)
            .collect();
        col.sort_by_key(|t| t.sort_key());
        col
    }

    /// One past the highest rank in a column, or 0 for an empty column.
    pub fn next_rank(&self, status: TaskStatus) -> i64 {
        self.tasks
            .values()
            .filter(|t| t.state.column() == status)
            .map(|t| t.order_index + 1)
            .max()
            .unwrap_or(0)
    }

    // -- mutation -----------------------------------------------------------

    /// Append a milestone after the existing ones.
    pub fn add_milestone(&mut self, name: impl Into<String>, summary: Option<String>) -> Uuid {
        let position = self
            .milestones
            .iter()
            .map(|m| m.position + 1)
            .max()
            .unwrap_or(0);
        let id = Uuid::new_v4();
        self.milestones.push(MilestoneNode {
            id,
            name: name.into(),
            summary,
            position,
            task_ids: Vec::new(),
        });
        id
    }

    /// Add a task with its direct dependencies.
    ///
    /// The graph assigns the initial state (`todo`, or `blocked(dependency)`
    /// if a dependency is not done), the rank (end of that column), and the
    /// position within the milestone. Every check runs before the graph is
    /// touched, so on error the graph is unchanged.
    pub fn add_task(&mut self, mut node: TaskNode, deps: &[Uuid]) -> Result<Uuid> {
        if node.project_id != self.project_id {
            return Err(PlanboardError::InvalidRequest(format!(
                "task belongs to project {}, graph is project {}",
                node.project_id, self.project_id
            )));
        }
        if self.tasks.contains_key(&node.id) {
            return Err(PlanboardError::InvalidRequest(format!(
                "task {} already exists",
                node.id
            )));
        }
        let deps: BTreeSet<Uuid> = deps.iter().copied().collect();
        for &dep in &deps {
            if dep != node.id && !self.tasks.contains_key(&dep) {
                return Err(self.foreign_dependency(node.id, dep));
            }
        }

        let mut adjacency = self.adjacency();
        adjacency.insert(node.id, deps.iter().copied().collect());
        if let Some(cycle) = find_cycle(&adjacency) {
            return Err(PlanboardError::CyclicDependency { cycle });
        }

        let unmet = deps
            .iter()
            .any(|d| !self.tasks.get(d).is_some_and(|t| t.state.is_done()));
        node.state = if unmet {
            TaskState::Blocked(BlockedReason::Dependency)
        } else {
            TaskState::Todo
        };

        let id = node.id;
        self.insert_node(node)?;
        for dep in deps {
            self.link(id, dep);
        }
        self.invalidate_closures();
        Ok(id)
    }

    /// Insert a node keeping its state, at the end of its column.
    pub(crate) fn insert_node(&mut self, mut node: TaskNode) -> Result<()> {
        if let Some(milestone_id) = node.milestone_id {
            let milestone = self
                .milestones
                .iter_mut()
                .find(|m| m.id == milestone_id)
                .ok_or_else(|| PlanboardError::NotFound {
                    what: "milestone",
                    id: milestone_id,
                })?;
            node.milestone_position = i32::try_from(milestone.task_ids.len()).map_err(|_| {
                PlanboardError::InvalidRequest(format!("milestone {milestone_id} is full"))
            })?;
            milestone.task_ids.push(node.id);
        }
        node.order_index = self.next_rank(node.state.column());
        self.tasks.insert(node.id, node);
        Ok(())
    }

    /// Add the edge `task -> depends_on`.
    ///
    /// Rejected with `CyclicDependency` if the edge would close a cycle, and
    /// with `UnmetDependency` if `task` is done while `depends_on` is not. A
    /// `todo` task that gains an unmet dependency becomes
    /// `blocked(dependency)`.
    pub fn add_dependency(&mut self, task: Uuid, depends_on: Uuid) -> Result<()> {
        let state = self.get(task)?.state;
        if task != depends_on && !self.tasks.contains_key(&depends_on) {
            return Err(self.foreign_dependency(task, depends_on));
        }
        if self.deps.get(&task).is_some_and(|d| d.contains(&depends_on)) {
            return Ok(());
        }

        let mut adjacency = self.adjacency();
        adjacency.entry(task).or_default().push(depends_on);
        if let Some(cycle) = find_cycle(&adjacency) {
            return Err(PlanboardError::CyclicDependency { cycle });
        }

        let dep_done = self.tasks.get(&depends_on).is_some_and(|t| t.state.is_done());
        if state.is_done() && !dep_done {
            return Err(PlanboardError::UnmetDependency {
                task_id: task,
                unmet: vec![depends_on],
            });
        }

        self.link(task, depends_on);
        self.invalidate_closures();
        if state == TaskState::Todo && !dep_done {
            self.set_state(task, TaskState::Blocked(BlockedReason::Dependency));
        }
        Ok(())
    }

    /// Change a task's state with no guard. Moving to another column places
    /// the task at the end of it; the rank is kept when the column is the
    /// same. Unknown ids are ignored.
    pub(crate) fn set_state(&mut self, id: Uuid, state: TaskState) {
        let Some(current) = self.tasks.get(&id).map(|t| t.state) else {
            return;
        };
        let rank = if current.column() == state.column() {
            None
        } else {
            Some(self.next_rank(state.column()))
        };
        if let Some(node) = self.tasks.get_mut(&id) {
            node.state = state;
            if let Some(rank) = rank {
                node.order_index = rank;
            }
        }
    }

    /// Move a task to `index` within its current column (clamped to the
    /// column length) and renumber that column densely from 0.
    pub(crate) fn place_in_column(&mut self, id: Uuid, index: usize) -> Result<usize> {
        let status = self.get(id)?.state.column();
        let mut order: Vec<Uuid> = self
            .column(status)
            .into_iter()
            .map(|t| t.id)
            .filter(|&t| t != id)
            .collect();
        let index = index.min(order.len());
        order.insert(index, id);
        for (rank, task_id) in (0i64..).zip(order) {
            if let Some(node) = self.tasks.get_mut(&task_id) {
                node.order_index = rank;
            }
        }
        Ok(index)
    }

    /// Tasks whose state or rank differ from `before`, sorted by id.
    /// Tasks absent from `before` are not reported.
    pub fn changes_since(&self, before: &TaskGraph) -> Vec<TaskPatch> {
        let mut patches: Vec<TaskPatch> = self
            .tasks
            .values()
            .filter(|t| {
                before
                    .tasks
                    .get(&t.id)
                    .is_some_and(|b| b.state != t.state || b.order_index != t.order_index)
            })
            .map(|t| TaskPatch {
                task_id: t.id,
                state: t.state,
                order_index: t.order_index,
            })
            .collect();
        patches.sort_by_key(|p| p.task_id);
        patches
    }

    // -- internals ----------------------------------------------------------

    fn link(&mut self, task: Uuid, depends_on: Uuid) {
        self.deps.entry(task).or_default().insert(depends_on);
        self.dependents.entry(depends_on).or_default().insert(task);
    }

    fn invalidate_closures(&self) {
        self.closure_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn adjacency(&self) -> BTreeMap<Uuid, Vec<Uuid>> {
        self.tasks
            .keys()
            .map(|&id| {
                let out = self
                    .deps
                    .get(&id)
                    .map(|d| d.iter().copied().collect())
                    .unwrap_or_default();
                (id, out)
            })
            .collect()
    }

    fn reachable(&self, start: Uuid, edges: &HashMap<Uuid, BTreeSet<Uuid>>) -> BTreeSet<Uuid> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<Uuid> = edges.get(&start).into_iter().flatten().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(edges.get(&next).into_iter().flatten().copied());
            }
        }
        seen
    }

    fn foreign_dependency(&self, task: Uuid, dep: Uuid) -> PlanboardError {
        PlanboardError::InvalidRequest(format!(
            "task {task} cannot depend on {dep}: not a task of project {}",
            self.project_id
        ))
    }
}
