//! Database query functions for the `projects` table.

use anyhow::{Context, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::Project;

/// Insert a new project row. Returns the row with server-generated defaults
/// (id, status, version, created_at).
pub async fn insert_project(
    pool: &PgPool,
    title: &str,
    description: Option<&str>,
    owner_id: Option<&str>,
) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (title, description, owner_id) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(title)
    .bind(description)
    .bind(owner_id)
    .fetch_one(pool)
    .await
    .context("failed to insert project")?;

    Ok(project)
}

/// Fetch a project by its ID.
pub async fn get_project<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch project")?;

    Ok(project)
}

/// List all projects, newest first.
pub async fn list_projects(pool: &PgPool) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list projects")?;

    Ok(projects)
}

/// Advance the project's version if it still equals `expected`.
///
/// Returns the number of rows affected: 0 means another writer committed
/// first (or the project does not exist) and the caller must roll back.
pub async fn bump_version<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    expected: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE projects SET version = version + 1 \
         WHERE id = $1 AND version = $2",
    )
    .bind(id)
    .bind(expected)
    .execute(executor)
    .await
    .context("failed to bump project version")?;

    Ok(result.rows_affected())
}
