//! Board columns and user-driven reordering.
//!
//! Ranks are plain integers. Every reorder renumbers the destination column
//! densely (`0..n`), so ranks never collide and never drift.

use serde::Serialize;
use uuid::Uuid;

use planboard_db::models::{BlockedReason, TaskStatus};

use crate::error::Result;
use crate::graph::{TaskGraph, TaskNode, TaskState};
use crate::state::{TaskStateMachine, TransitionOutcome};

/// Every task of a project grouped by column, each column in board order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoardColumns {
    pub todo: Vec<TaskNode>,
    pub doing: Vec<TaskNode>,
    pub done: Vec<TaskNode>,
    pub blocked: Vec<TaskNode>,
}

impl BoardColumns {
    pub fn from_graph(graph: &TaskGraph) -> Self {
        let collect = |status: TaskStatus| -> Vec<TaskNode> {
            graph.column(status).into_iter().cloned().collect()
        };
        Self {
            todo: collect(TaskStatus::Todo),
            doing: collect(TaskStatus::Doing),
            done: collect(TaskStatus::Done),
            blocked: collect(TaskStatus::Blocked),
        }
    }

    pub fn get(&self, status: TaskStatus) -> &[TaskNode] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::Doing => &self.doing,
            TaskStatus::Done => &self.done,
            TaskStatus::Blocked => &self.blocked,
        }
    }

    pub fn len(&self) -> usize {
        TaskStatus::ALL.iter().map(|&s| self.get(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a reorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderOutcome {
    pub task_id: Uuid,
    /// Column the task ended up in.
    pub status: TaskStatus,
    /// Final position within that column.
    pub index: usize,
    /// Present when the move changed the task's state.
    pub transition: Option<TransitionOutcome>,
}

/// Move a task to `index` in the `target` column.
///
/// A column change is a state transition and goes through
/// [`TaskStateMachine::apply`] first; if the guard rejects it the graph is
/// unchanged. Dropping into the blocked column means a manual block unless
/// the task is already blocked. If the state machine lands the task in a
/// different column than requested, it stays at the end of that column.
///
/// Repeating the same call leaves the board as it was after the first.
pub fn reorder(
    graph: &mut TaskGraph,
    task_id: Uuid,
    target: TaskStatus,
    index: usize,
) -> Result<ReorderOutcome> {
    let current = graph.get(task_id)?.state;
    let wanted = target_state(current, target);

    // Repeating a move that was redirected finds the task where it landed.
    let transition = if wanted == current
        || TaskStateMachine::landing_state(graph, task_id, wanted)? == current
    {
        None
    } else {
        Some(TaskStateMachine::apply(graph, task_id, wanted)?)
    };

    let landed = graph.get(task_id)?.state.column();
    let index = if landed == target {
        graph.place_in_column(task_id, index)?
    } else {
        graph
            .column(landed)
            .iter()
            .position(|t| t.id == task_id)
            .unwrap_or_default()
    };

    Ok(ReorderOutcome {
        task_id,
        status: landed,
        index,
        transition,
    })
}

fn target_state(current: TaskState, target: TaskStatus) -> TaskState {
    match target {
        TaskStatus::Todo => TaskState::Todo,
        TaskStatus::Doing => TaskState::Doing,
        TaskStatus::Done => TaskState::Done,
        TaskStatus::Blocked => match current {
            TaskState::Blocked(_) => current,
            _ => TaskState::Blocked(BlockedReason::Manual),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanboardError;

    fn board(n: usize) -> (TaskGraph, Vec<Uuid>) {
        let mut g = TaskGraph::new(Uuid::new_v4());
        let ids = (0..n)
            .map(|i| {
                g.add_task(TaskNode::new(g.project_id(), format!("t{i}"), 2.0), &[])
                    .unwrap()
            })
            .collect();
        (g, ids)
    }

    fn order(g: &TaskGraph, status: TaskStatus) -> Vec<Uuid> {
        g.column(status).iter().map(|t| t.id).collect()
    }

    #[test]
    fn reorder_within_column() {
        let (mut g, ids) = board(4);
        let out = reorder(&mut g, ids[3], TaskStatus::Todo, 1).unwrap();
        assert_eq!(out.index, 1);
        assert!(out.transition.is_none());
        assert_eq!(order(&g, TaskStatus::Todo), vec![ids[0], ids[3], ids[1], ids[2]]);
        let ranks: Vec<i64> = g.column(TaskStatus::Todo).iter().map(|t| t.order_index).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn reorder_is_idempotent() {
        let (mut g, ids) = board(5);
        reorder(&mut g, ids[0], TaskStatus::Doing, 0).unwrap();
        reorder(&mut g, ids[4], TaskStatus::Todo, 0).unwrap();
        let once = g.clone();
        reorder(&mut g, ids[4], TaskStatus::Todo, 0).unwrap();
        assert!(g.changes_since(&once).is_empty());
    }

    #[test]
    fn moving_across_columns_transitions() {
        let (mut g, ids) = board(3);
        reorder(&mut g, ids[0], TaskStatus::Doing, 0).unwrap();
        let out = reorder(&mut g, ids[1], TaskStatus::Doing, 0).unwrap();
        assert_eq!(out.status, TaskStatus::Doing);
        assert_eq!(order(&g, TaskStatus::Doing), vec![ids[1], ids[0]]);
        assert_eq!(order(&g, TaskStatus::Todo), vec![ids[2]]);
        let transition = out.transition.expect("column change is a transition");
        assert_eq!(transition.to, TaskState::Doing);
    }

    #[test]
    fn guard_failure_leaves_board_unchanged() {
        let (mut g, ids) = board(2);
        let before = g.clone();
        let err = reorder(&mut g, ids[0], TaskStatus::Done, 0).unwrap_err();
        assert!(matches!(err, PlanboardError::InvalidTransition { .. }));
        assert!(g.changes_since(&before).is_empty());
    }

    #[test]
    fn dropping_into_blocked_is_manual_block() {
        let (mut g, ids) = board(2);
        reorder(&mut g, ids[1], TaskStatus::Blocked, 0).unwrap();
        assert_eq!(
            g.get(ids[1]).unwrap().state,
            TaskState::Blocked(BlockedReason::Manual)
        );
    }

    #[test]
    fn reordering_inside_blocked_keeps_reason() {
        let (mut g, ids) = board(1);
        let dep = g
            .add_task(TaskNode::new(g.project_id(), "blocked", 1.0), &[ids[0]])
            .unwrap();
        reorder(&mut g, ids[0], TaskStatus::Blocked, 0).unwrap();
        let out = reorder(&mut g, dep, TaskStatus::Blocked, 0).unwrap();
        assert!(out.transition.is_none());
        assert_eq!(
            g.get(dep).unwrap().state,
            TaskState::Blocked(BlockedReason::Dependency)
        );
        assert_eq!(order(&g, TaskStatus::Blocked)[0], dep);
    }

    #[test]
    fn repeating_a_redirected_move_is_a_no_op() {
        let (mut g, ids) = board(1);
        let dep = g
            .add_task(TaskNode::new(g.project_id(), "waits", 1.0), &[ids[0]])
            .unwrap();
        TaskStateMachine::apply(&mut g, dep, TaskState::Blocked(BlockedReason::Manual)).unwrap();

        let first = reorder(&mut g, dep, TaskStatus::Todo, 0).unwrap();
        assert_eq!((first.status, first.index), (TaskStatus::Blocked, 0));
        assert_eq!(
            g.get(dep).unwrap().state,
            TaskState::Blocked(BlockedReason::Dependency)
        );

        let settled = g.clone();
        let second = reorder(&mut g, dep, TaskStatus::Todo, 0).unwrap();
        assert_eq!((second.status, second.index), (first.status, first.index));
        assert!(second.transition.is_none());
        assert!(g.changes_since(&settled).is_empty());
    }

    #[test]
    fn columns_group_by_status() {
        let (mut g, ids) = board(3);
        reorder(&mut g, ids[2], TaskStatus::Doing, 0).unwrap();
        let cols = BoardColumns::from_graph(&g);
        assert_eq!(cols.todo.len(), 2);
        assert_eq!(cols.doing.len(), 1);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols.get(TaskStatus::Doing)[0].id, ids[2]);
    }
}
