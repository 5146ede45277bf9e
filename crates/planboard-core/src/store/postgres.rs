//! PostgreSQL-backed store. One sqlx transaction per read snapshot and per
//! commit.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use planboard_db::models::Project;
use planboard_db::queries::{milestones, projects, tasks};

use super::{GraphSnapshot, Store, StoreError};
use crate::graph::TaskPatch;
use crate::plan::MaterializedPlan;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction and claim the next project version. Zero rows
    /// updated means the project is gone or another writer got there first.
    async fn begin_commit(
        &self,
        project_id: Uuid,
        expected: i64,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let rows = projects::bump_version(&mut *tx, project_id, expected).await?;
        if rows == 0 {
            let exists = projects::get_project(&mut *tx, project_id).await?.is_some();
            return Err(if exists {
                StoreError::Conflict {
                    project_id,
                    expected,
                }
            } else {
                StoreError::ProjectNotFound(project_id)
            });
        }
        Ok(tx)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_project(
        &self,
        title: &str,
        description: Option<&str>,
        owner_id: Option<&str>,
    ) -> Result<Project, StoreError> {
        Ok(projects::insert_project(&self.pool, title, description, owner_id).await?)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(projects::list_projects(&self.pool).await?)
    }

    async fn load_project(&self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(projects::get_project(&self.pool, project_id).await?)
    }

    async fn load_graph(&self, project_id: Uuid) -> Result<Option<GraphSnapshot>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin snapshot transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("failed to set snapshot isolation")?;

        let Some(project) = projects::get_project(&mut *tx, project_id).await? else {
            return Ok(None);
        };
        let milestones = milestones::list_milestones_for_project(&mut *tx, project_id).await?;
        let task_rows = tasks::list_tasks_for_project(&mut *tx, project_id).await?;
        let edges = tasks::list_dependency_edges(&mut *tx, project_id).await?;
        tx.commit()
            .await
            .context("failed to close snapshot transaction")?;

        Ok(Some(GraphSnapshot {
            project,
            milestones,
            tasks: task_rows,
            edges,
        }))
    }

    async fn find_project_for_task(&self, task_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(tasks::find_project_for_task(&self.pool, task_id).await?)
    }

    async fn commit_plan(
        &self,
        expected_version: i64,
        plan: &MaterializedPlan,
    ) -> Result<i64, StoreError> {
        let project_id = plan.project_id;
        let mut tx = self.begin_commit(project_id, expected_version).await?;

        for m in &plan.milestones {
            milestones::insert_milestone(
                &mut *tx,
                m.id,
                project_id,
                &m.name,
                m.summary.as_deref(),
                m.position,
            )
            .await?;
        }

        for node in &plan.tasks {
            let new = tasks::NewTask {
                id: node.id,
                project_id,
                milestone_id: node.milestone_id,
                title: &node.title,
                description: node.description.as_deref(),
                effort_hours: node.effort_hours,
                status: node.state.column(),
                blocked_reason: node.state.blocked_reason(),
                order_index: node.order_index,
                milestone_position: node.milestone_position,
            };
            tasks::insert_task(&mut *tx, &new).await?;
        }

        for &(task_id, depends_on) in &plan.edges {
            tasks::insert_task_dependency(&mut *tx, task_id, depends_on).await?;
        }

        tx.commit().await.context("failed to commit plan")?;
        Ok(expected_version + 1)
    }

    async fn commit_changes(
        &self,
        project_id: Uuid,
        expected_version: i64,
        patches: &[TaskPatch],
    ) -> Result<i64, StoreError> {
        let mut tx = self.begin_commit(project_id, expected_version).await?;

        for patch in patches {
            let rows = tasks::update_task_position(
                &mut *tx,
                project_id,
                patch.task_id,
                patch.state.column(),
                patch.state.blocked_reason(),
                patch.order_index,
            )
            .await?;
            if rows == 0 {
                return Err(StoreError::Backend(anyhow!(
                    "task {} is not in project {project_id}",
                    patch.task_id
                )));
            }
        }

        tx.commit().await.context("failed to commit task changes")?;
        Ok(expected_version + 1)
    }
}
