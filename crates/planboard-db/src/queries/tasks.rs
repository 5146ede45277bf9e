//! Database query functions for the `tasks` and `task_dependencies` tables.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{BlockedReason, Task, TaskDependency, TaskStatus};

/// Column values for a new task row. The id is chosen by the caller so that
/// dependency edges can be written in the same transaction.
#[derive(Debug, Clone)]
pub struct NewTask<'a> {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub effort_hours: f64,
    pub status: TaskStatus,
    pub blocked_reason: Option<BlockedReason>,
    pub order_index: i64,
    pub milestone_position: i32,
}

/// Insert a new task row.
pub async fn insert_task<'e, E: PgExecutor<'e>>(executor: E, new: &NewTask<'_>) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (id, project_id, milestone_id, title, description, effort_hours, \
                            status, blocked_reason, order_index, milestone_position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.project_id)
    .bind(new.milestone_id)
    .bind(new.title)
    .bind(new.description)
    .bind(new.effort_hours)
    .bind(new.status)
    .bind(new.blocked_reason)
    .bind(new.order_index)
    .bind(new.milestone_position)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert task {:?}", new.title))?;

    Ok(task)
}

/// List every task of a project in board order: by column, then rank, with
/// creation time and id as tie-breakers.
pub async fn list_tasks_for_project<'e, E: PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE project_id = $1 \
         ORDER BY status, order_index, created_at, id",
    )
    .bind(project_id)
    .fetch_all(executor)
    .await
    .context("failed to list tasks for project")?;

    Ok(tasks)
}

/// Insert a dependency edge: `task_id` depends on `depends_on_id`.
///
/// Uses `ON CONFLICT DO NOTHING` so this is idempotent.
pub async fn insert_task_dependency<'e, E: PgExecutor<'e>>(
    executor: E,
    task_id: Uuid,
    depends_on_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO task_dependencies (task_id, depends_on) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(task_id)
    .bind(depends_on_id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to insert dependency {task_id} -> {depends_on_id}"))?;

    Ok(())
}

/// All dependency edges whose dependent task belongs to the project.
pub async fn list_dependency_edges<'e, E: PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
) -> Result<Vec<TaskDependency>> {
    let edges = sqlx::query_as::<_, TaskDependency>(
        "SELECT td.task_id, td.depends_on FROM task_dependencies td \
         JOIN tasks t ON t.id = td.task_id \
         WHERE t.project_id = $1 \
         ORDER BY td.task_id, td.depends_on",
    )
    .bind(project_id)
    .fetch_all(executor)
    .await
    .context("failed to list dependency edges")?;

    Ok(edges)
}

/// Write a task's column, blocked reason, and rank.
///
/// Returns the number of rows affected (0 means the task does not belong to
/// the project).
pub async fn update_task_position<'e, E: PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
    task_id: Uuid,
    status: TaskStatus,
    blocked_reason: Option<BlockedReason>,
    order_index: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = $1, blocked_reason = $2, order_index = $3, updated_at = now() \
         WHERE id = $4 AND project_id = $5",
    )
    .bind(status)
    .bind(blocked_reason)
    .bind(order_index)
    .bind(task_id)
    .bind(project_id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to update task {task_id}"))?;

    Ok(result.rows_affected())
}

/// Project that owns a task, if the task exists.
pub async fn find_project_for_task(pool: &PgPool, task_id: Uuid) -> Result<Option<Uuid>> {
    let project_id: Option<Uuid> =
        sqlx::query_scalar("SELECT project_id FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(pool)
            .await
            .context("failed to look up task project")?;

    Ok(project_id)
}
