//! In-process store for tests and previews.
//!
//! Mirrors the PostgreSQL schema's guarantees: commits are all or nothing,
//! the version check is enforced, and ranks must be unique per
//! (project, status) once a commit is applied.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use planboard_db::models::{Milestone, Project, ProjectStatus, Task, TaskDependency};

use super::{GraphSnapshot, Store, StoreError};
use crate::graph::TaskPatch;
use crate::plan::MaterializedPlan;

#[derive(Debug, Default)]
struct State {
    projects: BTreeMap<Uuid, Project>,
    milestones: Vec<Milestone>,
    tasks: BTreeMap<Uuid, Task>,
    edges: Vec<TaskDependency>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail with a backend error.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of commits applied so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Total task rows across all projects.
    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(
        &self,
        state: &State,
        project_id: Uuid,
        expected: i64,
    ) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!("commit rejected by test hook")));
        }
        let project = state
            .projects
            .get(&project_id)
            .ok_or(StoreError::ProjectNotFound(project_id))?;
        if project.version != expected {
            return Err(StoreError::Conflict {
                project_id,
                expected,
            });
        }
        Ok(())
    }

    fn finish(&self, state: &mut State, project_id: Uuid) -> i64 {
        self.commits.fetch_add(1, Ordering::SeqCst);
        match state.projects.get_mut(&project_id) {
            Some(project) => {
                project.version += 1;
                project.version
            }
            None => 0,
        }
    }
}

fn check_ranks(tasks: &BTreeMap<Uuid, Task>, project_id: Uuid) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for task in tasks.values().filter(|t| t.project_id == project_id) {
        if !seen.insert((task.status, task.order_index)) {
            bail!(
                "duplicate rank {} in column {} of project {project_id}",
                task.order_index,
                task.status
            );
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_project(
        &self,
        title: &str,
        description: Option<&str>,
        owner_id: Option<&str>,
    ) -> Result<Project, StoreError> {
        let project = Project {
            id: Uuid::new_v4(),
            title: title.to_owned(),
            description: description.map(str::to_owned),
            status: ProjectStatus::Active,
            owner_id: owner_id.map(str::to_owned),
            version: 0,
            created_at: Utc::now(),
        };
        self.lock().projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> = self.lock().projects.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn load_project(&self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.lock().projects.get(&project_id).cloned())
    }

    async fn load_graph(&self, project_id: Uuid) -> Result<Option<GraphSnapshot>, StoreError> {
        let state = self.lock();
        let Some(project) = state.projects.get(&project_id).cloned() else {
            return Ok(None);
        };
        let tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        Ok(Some(GraphSnapshot {
            project,
            milestones: state
                .milestones
                .iter()
                .filter(|m| m.project_id == project_id)
                .cloned()
                .collect(),
            edges: state
                .edges
                .iter()
                .filter(|e| ids.contains(&e.task_id))
                .copied()
                .collect(),
            tasks,
        }))
    }

    async fn find_project_for_task(&self, task_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(self.lock().tasks.get(&task_id).map(|t| t.project_id))
    }

    async fn commit_plan(
        &self,
        expected_version: i64,
        plan: &MaterializedPlan,
    ) -> Result<i64, StoreError> {
        let project_id = plan.project_id;
        let mut state = self.lock();
        self.begin(&state, project_id, expected_version)?;

        let now = Utc::now();
        let mut tasks = state.tasks.clone();
        for node in &plan.tasks {
            if tasks.contains_key(&node.id) {
                return Err(StoreError::Backend(anyhow!("task {} already exists", node.id)));
            }
            tasks.insert(
                node.id,
                Task {
                    id: node.id,
                    project_id,
                    milestone_id: node.milestone_id,
                    title: node.title.clone(),
                    description: node.description.clone(),
                    effort_hours: node.effort_hours,
                    status: node.state.column(),
                    blocked_reason: node.state.blocked_reason(),
                    order_index: node.order_index,
                    milestone_position: node.milestone_position,
                    created_at: node.created_at,
                    updated_at: now,
                },
            );
        }
        for &(task_id, depends_on) in &plan.edges {
            if !tasks.contains_key(&task_id) || !tasks.contains_key(&depends_on) {
                return Err(StoreError::Backend(anyhow!(
                    "dependency {task_id} -> {depends_on} references a missing task"
                )));
            }
        }
        check_ranks(&tasks, project_id)?;

        state.tasks = tasks;
        state
            .milestones
            .extend(plan.milestones.iter().map(|m| Milestone {
                id: m.id,
                project_id,
                name: m.name.clone(),
                summary: m.summary.clone(),
                position: m.position,
                created_at: now,
            }));
        state
            .edges
            .extend(plan.edges.iter().map(|&(task_id, depends_on)| TaskDependency {
                task_id,
                depends_on,
            }));
        Ok(self.finish(&mut state, project_id))
    }

    async fn commit_changes(
        &self,
        project_id: Uuid,
        expected_version: i64,
        patches: &[TaskPatch],
    ) -> Result<i64, StoreError> {
        let mut state = self.lock();
        self.begin(&state, project_id, expected_version)?;

        let now = Utc::now();
        let mut tasks = state.tasks.clone();
        for patch in patches {
            let task = tasks
                .get_mut(&patch.task_id)
                .filter(|t| t.project_id == project_id)
                .ok_or_else(|| {
                    StoreError::Backend(anyhow!(
                        "task {} is not in project {project_id}",
                        patch.task_id
                    ))
                })?;
            task.status = patch.state.column();
            task.blocked_reason = patch.state.blocked_reason();
            task.order_index = patch.order_index;
            task.updated_at = now;
        }
        check_ranks(&tasks, project_id)?;

        state.tasks = tasks;
        Ok(self.finish(&mut state, project_id))
    }
}
