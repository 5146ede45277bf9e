//! Persistence collaborator.
//!
//! The core reads a whole project graph at once and writes back either a
//! freshly materialized plan or a set of task patches. Every write carries
//! the project version it was computed from; a store must refuse the write
//! if the version has moved on.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use planboard_db::models::{Milestone, Project, Task, TaskDependency};

use crate::error::{PlanboardError, Result};
use crate::graph::{TaskGraph, TaskPatch};
use crate::plan::MaterializedPlan;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Everything stored for one project, read consistently.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub project: Project,
    pub milestones: Vec<Milestone>,
    pub tasks: Vec<Task>,
    pub edges: Vec<TaskDependency>,
}

impl GraphSnapshot {
    pub fn version(&self) -> i64 {
        self.project.version
    }

    pub fn into_graph(self) -> Result<TaskGraph> {
        TaskGraph::from_rows(self.project.id, self.milestones, self.tasks, self.edges)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project {project_id} changed since version {expected}")]
    Conflict { project_id: Uuid, expected: i64 },

    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for PlanboardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                project_id,
                expected,
            } => PlanboardError::Conflict {
                project_id,
                expected,
            },
            StoreError::ProjectNotFound(id) => PlanboardError::project_not_found(id),
            StoreError::Backend(e) => PlanboardError::Persistence(e),
        }
    }
}

/// Transactional storage for projects and their task graphs.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_project(
        &self,
        title: &str,
        description: Option<&str>,
        owner_id: Option<&str>,
    ) -> std::result::Result<Project, StoreError>;

    async fn list_projects(&self) -> std::result::Result<Vec<Project>, StoreError>;

    async fn load_project(
        &self,
        project_id: Uuid,
    ) -> std::result::Result<Option<Project>, StoreError>;

    /// The project and its whole graph, or `None` if the project does not
    /// exist.
    async fn load_graph(
        &self,
        project_id: Uuid,
    ) -> std::result::Result<Option<GraphSnapshot>, StoreError>;

    async fn find_project_for_task(
        &self,
        task_id: Uuid,
    ) -> std::result::Result<Option<Uuid>, StoreError>;

    /// Insert every milestone, task, and edge of `plan`, all or nothing.
    /// Returns the new project version.
    async fn commit_plan(
        &self,
        expected_version: i64,
        plan: &MaterializedPlan,
    ) -> std::result::Result<i64, StoreError>;

    /// Write the state and rank of existing tasks, all or nothing. Returns
    /// the new project version.
    async fn commit_changes(
        &self,
        project_id: Uuid,
        expected_version: i64,
        patches: &[TaskPatch],
    ) -> std::result::Result<i64, StoreError>;
}
