//! Board service: the entry point for every board read and mutation.
//!
//! Mutations on one project are serialized by a per-project async mutex and
//! committed with the project version they were computed from, so neither a
//! second request in this process nor a writer elsewhere can cause a lost
//! update. Reads load a fresh snapshot and take no lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use planboard_db::models::{Project, TaskStatus};

use crate::board::{self, BoardColumns, ReorderOutcome};
use crate::error::{PlanboardError, Result};
use crate::graph::{MilestoneNode, TaskGraph, TaskNode, TaskState};
use crate::plan::{MaterializedPlan, Plan, materialize};
use crate::state::{TaskStateMachine, TransitionOutcome};
use crate::store::Store;

/// Ids created by committing a plan, in response order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanCommit {
    pub project_id: Uuid,
    pub milestone_ids: Vec<Uuid>,
    pub task_ids: Vec<Uuid>,
    pub version: i64,
}

/// A task added by hand rather than through a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_effort")]
    pub effort_hours: f64,
    #[serde(default)]
    pub milestone_id: Option<Uuid>,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
}

fn default_effort() -> f64 {
    1.0
}

/// Everything a board page shows.
#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub project: Project,
    pub milestones: Vec<MilestoneNode>,
    pub columns: BoardColumns,
    pub ready: Vec<Uuid>,
    pub needs_review: Vec<Uuid>,
}

type LockTable = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

pub struct BoardService {
    store: Arc<dyn Store>,
    /// Holds an entry only while some mutation holds or awaits the lock.
    locks: LockTable,
}

/// Held for the duration of one project mutation. Dropping it releases the
/// lock and removes the table entry when nobody else is waiting.
struct ProjectGuard<'a> {
    locks: &'a LockTable,
    project_id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for ProjectGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The table and this guard are the only owners left.
        let idle = Arc::strong_count(&self.lock) == 2;
        if idle
            && locks
                .get(&self.project_id)
                .is_some_and(|l| Arc::ptr_eq(l, &self.lock))
        {
            locks.remove(&self.project_id);
        }
    }
}

impl BoardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // -- projects -----------------------------------------------------------

    pub async fn create_project(&self, title: &str, description: Option<&str>) -> Result<Project> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PlanboardError::InvalidRequest(
                "project title must not be empty".into(),
            ));
        }
        let project = self.store.create_project(title, description, None).await?;
        info!(project_id = %project.id, title, "created project");
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn project(&self, project_id: Uuid) -> Result<Project> {
        self.store
            .load_project(project_id)
            .await?
            .ok_or_else(|| PlanboardError::project_not_found(project_id))
    }

    // -- reads --------------------------------------------------------------

    /// A fresh snapshot of the project's graph.
    pub async fn graph(&self, project_id: Uuid) -> Result<TaskGraph> {
        Ok(self.load(project_id).await?.0)
    }

    pub async fn list_columns(&self, project_id: Uuid) -> Result<BoardColumns> {
        let graph = self.graph(project_id).await?;
        Ok(BoardColumns::from_graph(&graph))
    }

    pub async fn board(&self, project_id: Uuid) -> Result<BoardView> {
        let project = self.project(project_id).await?;
        let graph = self.graph(project_id).await?;
        Ok(BoardView {
            project,
            milestones: graph.milestones().to_vec(),
            columns: BoardColumns::from_graph(&graph),
            ready: graph.ready_tasks(),
            needs_review: graph.needs_review(),
        })
    }

    pub async fn ready_tasks(&self, project_id: Uuid) -> Result<Vec<TaskNode>> {
        let graph = self.graph(project_id).await?;
        Ok(nodes(&graph, graph.ready_tasks()))
    }

    pub async fn blocked_tasks(&self, project_id: Uuid) -> Result<Vec<TaskNode>> {
        let graph = self.graph(project_id).await?;
        Ok(nodes(&graph, graph.blocked_tasks()))
    }

    pub async fn needs_review(&self, project_id: Uuid) -> Result<Vec<TaskNode>> {
        let graph = self.graph(project_id).await?;
        Ok(nodes(&graph, graph.needs_review()))
    }

    pub async fn dependencies_of(&self, task_id: Uuid) -> Result<Vec<TaskNode>> {
        let graph = self.graph(self.project_of(task_id).await?).await?;
        let deps = graph.dependencies_of(task_id)?;
        Ok(nodes(&graph, deps))
    }

    pub async fn transitive_dependencies_of(&self, task_id: Uuid) -> Result<Vec<TaskNode>> {
        let graph = self.graph(self.project_of(task_id).await?).await?;
        let deps = graph.transitive_dependencies_of(task_id)?;
        Ok(nodes(&graph, deps))
    }

    // -- mutations ----------------------------------------------------------

    /// Move a task to a new state through the state machine.
    pub async fn transition(&self, task_id: Uuid, to: TaskState) -> Result<TransitionOutcome> {
        let project_id = self.project_of(task_id).await?;
        let outcome = self
            .mutate(project_id, |graph| TaskStateMachine::apply(graph, task_id, to))
            .await?;
        info!(
            %task_id,
            from = %outcome.from,
            to = %outcome.to,
            automatic = outcome.automatic.len(),
            "transitioned task"
        );
        Ok(outcome)
    }

    /// Move a task to `index` in the `status` column.
    pub async fn reorder(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        index: usize,
    ) -> Result<ReorderOutcome> {
        let project_id = self.project_of(task_id).await?;
        let outcome = self
            .mutate(project_id, |graph| board::reorder(graph, task_id, status, index))
            .await?;
        debug!(%task_id, status = %outcome.status, index = outcome.index, "reordered task");
        Ok(outcome)
    }

    /// Add a single task by hand.
    pub async fn add_task(&self, project_id: Uuid, request: NewTaskRequest) -> Result<TaskNode> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(PlanboardError::InvalidRequest(
                "task title must not be empty".into(),
            ));
        }
        if !(request.effort_hours.is_finite() && request.effort_hours > 0.0) {
            return Err(PlanboardError::InvalidRequest(
                "effort_hours must be a positive number".into(),
            ));
        }
        for dep in &request.depends_on {
            match self.store.find_project_for_task(*dep).await? {
                Some(p) if p == project_id => {}
                Some(other) => {
                    return Err(PlanboardError::InvalidRequest(format!(
                        "task {dep} belongs to project {other}, not {project_id}"
                    )));
                }
                None => return Err(PlanboardError::task_not_found(*dep)),
            }
        }

        let mut node = TaskNode::new(project_id, title, request.effort_hours);
        node.description = request.description.clone();
        node.milestone_id = request.milestone_id;

        let (committed, _) = self
            .commit_new(project_id, None, |graph| {
                let id = graph.add_task(node, &request.depends_on)?;
                let added = graph.get(id)?.clone();
                let edges = graph
                    .dependencies_of(id)?
                    .into_iter()
                    .map(|d| (id, d))
                    .collect();
                Ok(MaterializedPlan {
                    project_id,
                    milestones: Vec::new(),
                    tasks: vec![added],
                    edges,
                })
            })
            .await?;
        let added = committed.tasks.into_iter().next().ok_or_else(|| {
            PlanboardError::Persistence(anyhow::anyhow!("added task missing from commit"))
        })?;
        info!(%project_id, task_id = %added.id, state = %added.state, "added task");
        Ok(added)
    }

    /// Materialize a validated plan into the project and commit it.
    ///
    /// Takes the project lock only now, after the model has answered. If
    /// `cancel` fires before the commit starts, nothing is written.
    pub async fn commit_plan(
        &self,
        project_id: Uuid,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<PlanCommit> {
        let (materialized, version) = self
            .commit_new(project_id, Some(cancel), |graph| materialize(graph, plan))
            .await?;
        info!(
            %project_id,
            milestones = materialized.milestones.len(),
            tasks = materialized.tasks.len(),
            edges = materialized.edges.len(),
            version,
            "committed plan"
        );
        Ok(PlanCommit {
            project_id,
            milestone_ids: materialized.milestone_ids(),
            task_ids: materialized.task_ids(),
            version,
        })
    }

    // -- internals ----------------------------------------------------------

    async fn lock_project(&self, project_id: Uuid) -> ProjectGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(project_id).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        ProjectGuard {
            locks: &self.locks,
            project_id,
            lock,
            guard: Some(guard),
        }
    }

    async fn load(&self, project_id: Uuid) -> Result<(TaskGraph, i64)> {
        let snapshot = self
            .store
            .load_graph(project_id)
            .await?
            .ok_or_else(|| PlanboardError::project_not_found(project_id))?;
        let version = snapshot.version();
        Ok((snapshot.into_graph()?, version))
    }

    async fn project_of(&self, task_id: Uuid) -> Result<Uuid> {
        self.store
            .find_project_for_task(task_id)
            .await?
            .ok_or_else(|| PlanboardError::task_not_found(task_id))
    }

    /// Apply `op` to a copy of the project's graph under the project lock and
    /// commit whatever tasks it changed. A failing `op` writes nothing.
    async fn mutate<T>(
        &self,
        project_id: Uuid,
        op: impl FnOnce(&mut TaskGraph) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock_project(project_id).await;

        let (before, version) = self.load(project_id).await?;
        let mut graph = before.clone();
        let out = op(&mut graph)?;

        let patches = graph.changes_since(&before);
        if !patches.is_empty() {
            debug!(%project_id, patches = patches.len(), version, "committing task changes");
            self.store
                .commit_changes(project_id, version, &patches)
                .await?;
        }
        Ok(out)
    }

    /// Like [`Self::mutate`], for operations that create tasks.
    async fn commit_new(
        &self,
        project_id: Uuid,
        cancel: Option<&CancellationToken>,
        op: impl FnOnce(&mut TaskGraph) -> Result<MaterializedPlan>,
    ) -> Result<(MaterializedPlan, i64)> {
        let _guard = self.lock_project(project_id).await;

        let (mut graph, version) = self.load(project_id).await?;
        let materialized = op(&mut graph)?;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            info!(%project_id, "ingestion cancelled before commit");
            return Err(PlanboardError::Cancelled);
        }
        let new_version = self.store.commit_plan(version, &materialized).await?;
        Ok((materialized, new_version))
    }
}

fn nodes(graph: &TaskGraph, ids: impl IntoIterator<Item = Uuid>) -> Vec<TaskNode> {
    ids.into_iter()
        .filter_map(|id| graph.task(id).cloned())
        .collect()
}
