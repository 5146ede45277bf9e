//! Task state machine transitions.
//!
//! Validates user-requested moves against the transition table, enforces
//! dependency gating on completion, and re-derives the automatic
//! `blocked(dependency)` label for everything downstream of the moved task.

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use planboard_db::models::BlockedReason;

use crate::error::{PlanboardError, Result};
use crate::graph::{TaskGraph, TaskState};

/// A state change applied by propagation rather than by the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusChange {
    pub task_id: Uuid,
    pub from: TaskState,
    pub to: TaskState,
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub task_id: Uuid,
    pub from: TaskState,
    /// Where the task actually landed. Differs from the requested state when
    /// a task returned to `todo` still has unmet dependencies.
    pub to: TaskState,
    /// Dependents moved between `todo` and `blocked(dependency)`.
    pub automatic: Vec<StatusChange>,
    /// Done tasks downstream of a reopened task. Their status is left alone.
    pub needs_review: Vec<Uuid>,
}

impl TransitionOutcome {
    fn unchanged(task_id: Uuid, state: TaskState) -> Self {
        Self {
            task_id,
            from: state,
            to: state,
            automatic: Vec::new(),
            needs_review: Vec::new(),
        }
    }
}

/// The task state machine.
///
/// User-initiated moves:
///
/// ```text
/// todo             -> doing
/// todo             -> blocked(manual)
/// doing            -> done             (every dependency done)
/// doing            -> todo
/// done             -> doing | todo     (reopen)
/// any              -> blocked(manual)
/// blocked(manual)  -> todo | doing
/// ```
///
/// `blocked(dependency)` is entered and left only by propagation.
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Check whether a user may move a task from `from` to `to`.
    pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (from, to),
            (Todo, Doing)
                | (Doing, Done)
                | (Doing, Todo)
                | (Done, Doing)
                | (Done, Todo)
                | (_, Blocked(BlockedReason::Manual))
                | (Blocked(BlockedReason::Manual), Todo)
                | (Blocked(BlockedReason::Manual), Doing)
        )
    }

    /// The state a move to `to` ends in. A task cannot sit in `todo` while
    /// something it needs is not done, so such a move lands in
    /// `blocked(dependency)`.
    pub fn landing_state(graph: &TaskGraph, task_id: Uuid, to: TaskState) -> Result<TaskState> {
        graph.get(task_id)?;
        if to == TaskState::Todo && graph.has_unmet_dependencies(task_id) {
            Ok(TaskState::Blocked(BlockedReason::Dependency))
        } else {
            Ok(to)
        }
    }

    /// Apply a user-requested transition to `graph`.
    ///
    /// Requesting the task's current state is a no-op. On error the graph is
    /// unchanged.
    pub fn apply(graph: &mut TaskGraph, task_id: Uuid, to: TaskState) -> Result<TransitionOutcome> {
        let from = graph.get(task_id)?.state;
        if from == to {
            return Ok(TransitionOutcome::unchanged(task_id, from));
        }

        if !Self::is_valid_transition(from, to) {
            warn!(%task_id, %from, %to, "rejected transition");
            return Err(PlanboardError::InvalidTransition { task_id, from, to });
        }

        if to.is_done() {
            let unmet = graph.unmet_dependencies(task_id);
            if !unmet.is_empty() {
                warn!(%task_id, unmet = unmet.len(), "rejected completion with unmet dependencies");
                return Err(PlanboardError::UnmetDependency { task_id, unmet });
            }
        }

        let landed = Self::landing_state(graph, task_id, to)?;

        let needs_review = if from.is_done() && !landed.is_done() {
            done_dependents(graph, task_id)?
        } else {
            Vec::new()
        };

        graph.set_state(task_id, landed);
        let automatic = propagate(graph, task_id);

        debug!(
            %task_id,
            %from,
            to = %landed,
            automatic = automatic.len(),
            needs_review = needs_review.len(),
            "applied transition"
        );

        Ok(TransitionOutcome {
            task_id,
            from,
            to: landed,
            automatic,
            needs_review,
        })
    }
}

/// Re-derive the dependency label of everything downstream of `origin`,
/// breadth-first. Only `todo` and `blocked(dependency)` tasks move; the walk
/// continues past a task only if it changed, and each task is visited once.
fn propagate(graph: &mut TaskGraph, origin: Uuid) -> Vec<StatusChange> {
    let mut changes = Vec::new();
    let mut seen = BTreeSet::from([origin]);
    let mut queue: VecDeque<Uuid> = graph
        .dependents_of(origin)
        .unwrap_or_default()
        .into_iter()
        .collect();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(current) = graph.task(id).map(|t| t.state) else {
            continue;
        };
        let unmet = graph.has_unmet_dependencies(id);
        let next = match current {
            TaskState::Todo if unmet => TaskState::Blocked(BlockedReason::Dependency),
            TaskState::Blocked(BlockedReason::Dependency) if !unmet => TaskState::Todo,
            other => other,
        };
        if next == current {
            continue;
        }

        debug!(task_id = %id, from = %current, to = %next, "propagated");
        graph.set_state(id, next);
        changes.push(StatusChange {
            task_id: id,
            from: current,
            to: next,
        });
        queue.extend(graph.dependents_of(id).unwrap_or_default());
    }

    changes
}

fn done_dependents(graph: &TaskGraph, task_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(graph
        .transitive_dependents_of(task_id)?
        .into_iter()
        .filter(|d| graph.task(*d).is_some_and(|t| t.state.is_done()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskNode;
    use planboard_db::models::TaskStatus;

    const DEP: TaskState = TaskState::Blocked(BlockedReason::Dependency);
    const MANUAL: TaskState = TaskState::Blocked(BlockedReason::Manual);

    fn add(g: &mut TaskGraph, title: &str, deps: &[Uuid]) -> Uuid {
        g.add_task(TaskNode::new(g.project_id(), title, 3.0), deps)
            .expect("add_task")
    }

    fn state(g: &TaskGraph, id: Uuid) -> TaskState {
        g.get(id).unwrap().state
    }

    fn finish(g: &mut TaskGraph, id: Uuid) {
        TaskStateMachine::apply(g, id, TaskState::Doing).unwrap();
        TaskStateMachine::apply(g, id, TaskState::Done).unwrap();
    }

    #[test]
    fn transition_table() {
        use TaskState::*;
        let valid = [
            (Todo, Doing),
            (Todo, MANUAL),
            (Doing, Done),
            (Doing, Todo),
            (Doing, MANUAL),
            (Done, Doing),
            (Done, Todo),
            (Done, MANUAL),
            (DEP, MANUAL),
            (MANUAL, Todo),
            (MANUAL, Doing),
        ];
        for (from, to) in valid {
            assert!(
                TaskStateMachine::is_valid_transition(from, to),
                "{from} -> {to} should be valid"
            );
        }

        let invalid = [
            (Todo, Done),
            (MANUAL, Done),
            (DEP, Todo),
            (DEP, Doing),
            (DEP, Done),
            (Todo, DEP),
            (Doing, DEP),
            (Done, DEP),
            (MANUAL, DEP),
        ];
        for (from, to) in invalid {
            assert!(
                !TaskStateMachine::is_valid_transition(from, to),
                "{from} -> {to} should be invalid"
            );
        }
    }

    #[test]
    fn completing_with_pending_dependency_is_rejected() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let b = add(&mut g, "b", &[]);
        TaskStateMachine::apply(&mut g, b, TaskState::Doing).unwrap();
        g.add_dependency(b, a).unwrap();
        let before = g.clone();

        let err = TaskStateMachine::apply(&mut g, b, TaskState::Done).unwrap_err();
        match err {
            PlanboardError::UnmetDependency { task_id, unmet } => {
                assert_eq!(task_id, b);
                assert_eq!(unmet, vec![a]);
            }
            other => panic!("expected UnmetDependency, got {other:?}"),
        }
        assert_eq!(state(&g, b), TaskState::Doing);
        assert!(g.changes_since(&before).is_empty());
    }

    #[test]
    fn todo_straight_to_done_is_invalid() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let err = TaskStateMachine::apply(&mut g, a, TaskState::Done).unwrap_err();
        assert!(matches!(err, PlanboardError::InvalidTransition { .. }));
        assert_eq!(state(&g, a), TaskState::Todo);
    }

    #[test]
    fn dependency_block_cannot_be_lifted_by_hand() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let b = add(&mut g, "b", &[a]);
        assert_eq!(state(&g, b), DEP);
        let err = TaskStateMachine::apply(&mut g, b, TaskState::Todo).unwrap_err();
        assert!(matches!(err, PlanboardError::InvalidTransition { .. }));
    }

    #[test]
    fn completing_dependency_unblocks_dependents() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let b = add(&mut g, "b", &[a]);
        let c = add(&mut g, "c", &[a, b]);

        TaskStateMachine::apply(&mut g, a, TaskState::Doing).unwrap();
        let outcome = TaskStateMachine::apply(&mut g, a, TaskState::Done).unwrap();

        assert_eq!(
            outcome.automatic,
            vec![StatusChange {
                task_id: b,
                from: DEP,
                to: TaskState::Todo
            }]
        );
        assert_eq!(state(&g, b), TaskState::Todo);
        // c still waits on b.
        assert_eq!(state(&g, c), DEP);
        assert_eq!(g.ready_tasks(), vec![b]);
    }

    #[test]
    fn reopening_reblocks_todo_dependents_and_flags_done_ones() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let b = add(&mut g, "b", &[a]);
        let c = add(&mut g, "c", &[b]);
        let d = add(&mut g, "d", &[a]);
        finish(&mut g, a);
        finish(&mut g, b);
        finish(&mut g, c);
        assert_eq!(state(&g, d), TaskState::Todo);

        let outcome = TaskStateMachine::apply(&mut g, a, TaskState::Doing).unwrap();
        let mut flagged = outcome.needs_review.clone();
        flagged.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(flagged, expected);

        // Done dependents keep their status.
        assert_eq!(state(&g, b), TaskState::Done);
        assert_eq!(state(&g, c), TaskState::Done);
        assert_eq!(state(&g, d), DEP);
        assert_eq!(outcome.automatic.len(), 1);
    }

    #[test]
    fn manual_unblock_with_unmet_dependency_lands_dependency_blocked() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let b = add(&mut g, "b", &[a]);
        TaskStateMachine::apply(&mut g, b, MANUAL).unwrap();

        let outcome = TaskStateMachine::apply(&mut g, b, TaskState::Todo).unwrap();
        assert_eq!(outcome.to, DEP);
        assert_eq!(state(&g, b), DEP);
    }

    #[test]
    fn manual_block_from_any_state_and_back() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        TaskStateMachine::apply(&mut g, a, TaskState::Doing).unwrap();
        TaskStateMachine::apply(&mut g, a, MANUAL).unwrap();
        assert_eq!(g.get(a).unwrap().state.column(), TaskStatus::Blocked);
        assert!(g.is_blocked(a).unwrap());

        TaskStateMachine::apply(&mut g, a, TaskState::Doing).unwrap();
        assert_eq!(state(&g, a), TaskState::Doing);
    }

    #[test]
    fn same_state_is_a_no_op() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let a = add(&mut g, "a", &[]);
        let before = g.clone();
        let outcome = TaskStateMachine::apply(&mut g, a, TaskState::Todo).unwrap();
        assert_eq!(outcome.from, outcome.to);
        assert!(g.changes_since(&before).is_empty());
    }

    #[test]
    fn unknown_task_is_not_found() {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let err = TaskStateMachine::apply(&mut g, Uuid::new_v4(), TaskState::Doing).unwrap_err();
        assert!(matches!(err, PlanboardError::NotFound { what: "task", .. }));
    }
}
