//! Database query functions for the `milestones` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Milestone;

/// Insert a milestone with a caller-chosen id.
pub async fn insert_milestone<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    project_id: Uuid,
    name: &str,
    summary: Option<&str>,
    position: i32,
) -> Result<Milestone> {
    let milestone = sqlx::query_as::<_, Milestone>(
        "INSERT INTO milestones (id, project_id, name, summary, position) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(id)
    .bind(project_id)
    .bind(name)
    .bind(summary)
    .bind(position)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert milestone {name:?}"))?;

    Ok(milestone)
}

/// List a project's milestones in plan order.
pub async fn list_milestones_for_project<'e, E: PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
) -> Result<Vec<Milestone>> {
    let milestones = sqlx::query_as::<_, Milestone>(
        "SELECT * FROM milestones WHERE project_id = $1 ORDER BY position ASC",
    )
    .bind(project_id)
    .fetch_all(executor)
    .await
    .context("failed to list milestones for project")?;

    Ok(milestones)
}
