//! Materialization: turning a validated [`Plan`] into graph entities.
//!
//! Runs against an in-memory copy of the project graph. Nothing reaches the
//! store until the caller commits the returned [`MaterializedPlan`] in one
//! transaction, so a failure at any point leaves no partial plan behind.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use planboard_db::models::BlockedReason;

use super::schema::Plan;
use crate::error::{PlanboardError, Result};
use crate::graph::{MilestoneNode, TaskGraph, TaskNode, TaskState};

/// New entities produced from one plan, in response order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializedPlan {
    pub project_id: Uuid,
    pub milestones: Vec<MilestoneNode>,
    pub tasks: Vec<TaskNode>,
    /// `(task, depends_on)` pairs.
    pub edges: Vec<(Uuid, Uuid)>,
}

impl MaterializedPlan {
    pub fn milestone_ids(&self) -> Vec<Uuid> {
        self.milestones.iter().map(|m| m.id).collect()
    }

    pub fn task_ids(&self) -> Vec<Uuid> {
        self.tasks.iter().map(|t| t.id).collect()
    }
}

/// Add every milestone, task, and edge of `plan` to `graph`.
///
/// Milestones are appended after any existing ones. A task with no
/// dependencies starts in `todo`, one with dependencies in
/// `blocked(dependency)`; ranks continue densely from the end of each column
/// in response order. Edges go through [`TaskGraph::add_dependency`], so the
/// cycle check runs on every insertion even though the validator has already
/// checked the plan.
pub fn materialize(graph: &mut TaskGraph, plan: &Plan) -> Result<MaterializedPlan> {
    let project_id = graph.project_id();
    let mut ids_by_key: HashMap<&str, Uuid> = HashMap::new();
    let mut milestone_ids = Vec::with_capacity(plan.milestones.len());
    let mut task_ids = Vec::with_capacity(plan.task_count());

    for planned in &plan.milestones {
        let milestone_id = graph.add_milestone(planned.name.clone(), planned.summary.clone());
        milestone_ids.push(milestone_id);

        for task in &planned.tasks {
            if ids_by_key.contains_key(task.key.as_str()) {
                return Err(PlanboardError::InvalidRequest(format!(
                    "plan repeats task reference {:?}",
                    task.key
                )));
            }
            let mut node = TaskNode::new(project_id, task.title.clone(), task.effort_hours);
            node.milestone_id = Some(milestone_id);
            node.description = task.description.clone();
            node.state = if task.depends_on.is_empty() {
                TaskState::Todo
            } else {
                TaskState::Blocked(BlockedReason::Dependency)
            };
            ids_by_key.insert(&task.key, node.id);
            task_ids.push(node.id);
            graph.insert_node(node)?;
        }
    }

    let mut edges = Vec::new();
    for task in plan.tasks() {
        let Some(&task_id) = ids_by_key.get(task.key.as_str()) else {
            continue;
        };
        for dep_key in &task.depends_on {
            let dep_id = ids_by_key.get(dep_key.as_str()).copied().ok_or_else(|| {
                PlanboardError::InvalidRequest(format!(
                    "task {:?} depends on unknown reference {dep_key:?}",
                    task.key
                ))
            })?;
            graph.add_dependency(task_id, dep_id)?;
            edges.push((task_id, dep_id));
        }
    }

    let milestones = milestone_ids
        .iter()
        .filter_map(|id| graph.milestones().iter().find(|m| m.id == *id).cloned())
        .collect();
    let tasks = task_ids
        .iter()
        .filter_map(|id| graph.task(*id).cloned())
        .collect();

    Ok(MaterializedPlan {
        project_id,
        milestones,
        tasks,
        edges,
    })
}
