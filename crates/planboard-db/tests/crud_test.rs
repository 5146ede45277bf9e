//! Integration tests for project, milestone, and task CRUD queries.
//!
//! Each test creates an isolated, migrated database through
//! `planboard-test-utils` and drops it on completion.

use uuid::Uuid;

use planboard_db::models::{BlockedReason, ProjectStatus, TaskDependency, TaskStatus};
use planboard_db::pool;
use planboard_db::queries::tasks::NewTask;
use planboard_db::queries::{milestones, projects, tasks};
use planboard_test_utils::TestDb;

fn new_task(project_id: Uuid, title: &str, status: TaskStatus, order_index: i64) -> NewTask<'_> {
    NewTask {
        id: Uuid::new_v4(),
        project_id,
        milestone_id: None,
        title,
        description: None,
        effort_hours: 3.0,
        status,
        blocked_reason: (status == TaskStatus::Blocked).then_some(BlockedReason::Dependency),
        order_index,
        milestone_position: 0,
    }
}

// -----------------------------------------------------------------------
// Migrations
// -----------------------------------------------------------------------

#[tokio::test]
async fn migrations_create_all_tables() {
    let db = TestDb::create().await;

    let counts = pool::table_counts(&db.pool).await.expect("counts");
    let names: Vec<&str> = counts.iter().map(|(t, _)| *t).collect();
    assert_eq!(names, ["projects", "milestones", "tasks", "task_dependencies"]);
    assert!(counts.iter().all(|(_, n)| *n == 0));

    db.drop().await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = TestDb::create().await;
    pool::run_migrations(&db.pool)
        .await
        .expect("second run should be a no-op");
    db.drop().await;
}

// -----------------------------------------------------------------------
// Projects
// -----------------------------------------------------------------------

#[tokio::test]
async fn insert_and_get_project() {
    let db = TestDb::create().await;

    let project = projects::insert_project(&db.pool, "Launch", Some("MVP site"), Some("user-1"))
        .await
        .expect("insert_project should succeed");
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(project.version, 0);

    let fetched = projects::get_project(&db.pool, project.id)
        .await
        .unwrap()
        .expect("project should exist");
    assert_eq!(fetched.title, "Launch");
    assert_eq!(fetched.owner_id.as_deref(), Some("user-1"));

    assert!(projects::get_project(&db.pool, Uuid::new_v4()).await.unwrap().is_none());

    db.drop().await;
}

#[tokio::test]
async fn bump_version_rejects_stale_expectation() {
    let db = TestDb::create().await;
    let project = db.seed_project().await;

    assert_eq!(projects::bump_version(&db.pool, project.id, 0).await.unwrap(), 1);
    assert_eq!(projects::bump_version(&db.pool, project.id, 0).await.unwrap(), 0);

    let fetched = projects::get_project(&db.pool, project.id).await.unwrap().unwrap();
    assert_eq!(fetched.version, 1);

    db.drop().await;
}

// -----------------------------------------------------------------------
// Milestones and tasks
// -----------------------------------------------------------------------

#[tokio::test]
async fn milestones_list_in_position_order() {
    let db = TestDb::create().await;
    let project = db.seed_project().await;

    milestones::insert_milestone(&db.pool, Uuid::new_v4(), project.id, "second", None, 1)
        .await
        .unwrap();
    milestones::insert_milestone(&db.pool, Uuid::new_v4(), project.id, "first", Some("s"), 0)
        .await
        .unwrap();

    let listed = milestones::list_milestones_for_project(&db.pool, project.id)
        .await
        .unwrap();
    let names: Vec<&str> = listed.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["first", "second"]);

    db.drop().await;
}

#[tokio::test]
async fn dependencies_and_positions_persist() {
    let db = TestDb::create().await;
    let project = db.seed_project().await;

    let a = tasks::insert_task(&db.pool, &new_task(project.id, "a", TaskStatus::Todo, 0))
        .await
        .unwrap();
    let b = tasks::insert_task(&db.pool, &new_task(project.id, "b", TaskStatus::Blocked, 0))
        .await
        .unwrap();
    tasks::insert_task_dependency(&db.pool, b.id, a.id).await.unwrap();
    // Idempotent.
    tasks::insert_task_dependency(&db.pool, b.id, a.id).await.unwrap();

    let edges = tasks::list_dependency_edges(&db.pool, project.id).await.unwrap();
    assert_eq!(
        edges,
        vec![TaskDependency {
            task_id: b.id,
            depends_on: a.id
        }]
    );

    tasks::update_task_position(&db.pool, project.id, a.id, TaskStatus::Done, None, 0)
        .await
        .unwrap();
    tasks::update_task_position(&db.pool, project.id, b.id, TaskStatus::Todo, None, 0)
        .await
        .unwrap();

    let rows = tasks::list_tasks_for_project(&db.pool, project.id).await.unwrap();
    let moved = rows.iter().find(|t| t.id == b.id).expect("task b exists");
    assert_eq!(moved.status, TaskStatus::Todo);
    assert_eq!(moved.blocked_reason, None);

    // A task of another project is never touched.
    let other = db.seed_project().await;
    let rows = tasks::update_task_position(&db.pool, other.id, a.id, TaskStatus::Doing, None, 0)
        .await
        .unwrap();
    assert_eq!(rows, 0);

    assert_eq!(
        tasks::find_project_for_task(&db.pool, b.id).await.unwrap(),
        Some(project.id)
    );
    assert_eq!(tasks::find_project_for_task(&db.pool, Uuid::new_v4()).await.unwrap(), None);

    db.drop().await;
}

#[tokio::test]
async fn self_dependency_is_rejected_by_schema() {
    let db = TestDb::create().await;
    let project = db.seed_project().await;

    let a = tasks::insert_task(&db.pool, &new_task(project.id, "a", TaskStatus::Todo, 0))
        .await
        .unwrap();
    let err = tasks::insert_task_dependency(&db.pool, a.id, a.id).await;
    assert!(err.is_err(), "task_id <> depends_on check should fire");

    db.drop().await;
}

#[tokio::test]
async fn duplicate_rank_in_column_fails_at_commit() {
    let db = TestDb::create().await;
    let project = db.seed_project().await;

    let mut tx = db.pool.begin().await.unwrap();
    tasks::insert_task(&mut *tx, &new_task(project.id, "a", TaskStatus::Todo, 0))
        .await
        .unwrap();
    // Deferred constraint: the duplicate is accepted until commit.
    tasks::insert_task(&mut *tx, &new_task(project.id, "b", TaskStatus::Todo, 0))
        .await
        .unwrap();
    assert!(tx.commit().await.is_err());

    assert!(tasks::list_tasks_for_project(&db.pool, project.id)
        .await
        .unwrap()
        .is_empty());

    db.drop().await;
}

#[tokio::test]
async fn blocked_status_requires_reason() {
    let db = TestDb::create().await;
    let project = db.seed_project().await;

    let mut row = new_task(project.id, "a", TaskStatus::Blocked, 0);
    row.blocked_reason = None;
    assert!(tasks::insert_task(&db.pool, &row).await.is_err());

    db.drop().await;
}
