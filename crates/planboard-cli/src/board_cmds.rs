//! CLI handlers for `planboard board` subcommands.
//!
//! Implements:
//! - `planboard board show <project-id>`                  -- columns, ready, review
//! - `planboard board move <task-id> <status>`            -- state transition
//! - `planboard board reorder <task-id> <status> <index>` -- position in a column

use anyhow::Result;
use uuid::Uuid;

use planboard_core::graph::TaskNode;
use planboard_core::service::BoardView;
use planboard_core::state::TransitionOutcome;
use planboard_core::BoardService;
use planboard_db::models::TaskStatus;

use crate::BoardCommands;
use crate::resolve::{parse_id, parse_state, parse_status};

/// Dispatch a `BoardCommands` variant to the appropriate handler.
pub async fn run_board_command(command: BoardCommands, board: &BoardService) -> Result<()> {
    match command {
        BoardCommands::Show { project_id } => {
            let project_id = parse_id("project", &project_id)?;
            let view = board.board(project_id).await?;
            print!("{}", render_board(&view));
            Ok(())
        }
        BoardCommands::Move { task_id, status } => {
            let task_id = parse_id("task", &task_id)?;
            let to = parse_state(&status)?;
            let outcome = board.transition(task_id, to).await?;
            print_transition(&outcome);
            Ok(())
        }
        BoardCommands::Reorder {
            task_id,
            status,
            index,
        } => {
            let task_id = parse_id("task", &task_id)?;
            let status = parse_status(&status)?;
            let outcome = board.reorder(task_id, status, index).await?;
            println!(
                "Task {task_id} is now at position {} in {}.",
                outcome.index, outcome.status
            );
            if let Some(transition) = &outcome.transition {
                print_transition(transition);
            }
            Ok(())
        }
    }
}

fn print_transition(outcome: &TransitionOutcome) {
    if outcome.from == outcome.to {
        println!("Task {} is already {}.", outcome.task_id, outcome.to);
        return;
    }
    println!("Task {}: {} -> {}", outcome.task_id, outcome.from, outcome.to);
    for change in &outcome.automatic {
        println!("  {}: {} -> {}", change.task_id, change.from, change.to);
    }
    if !outcome.needs_review.is_empty() {
        println!("Needs review (done, but a dependency was reopened):");
        for id in &outcome.needs_review {
            println!("  {id}");
        }
    }
}

/// Plain-text board: one section per column, then the ready and
/// needs-review lists.
pub fn render_board(view: &BoardView) -> String {
    let mut out = format!(
        "{} ({})  version {}\n",
        view.project.title, view.project.id, view.project.version
    );
    for status in TaskStatus::ALL {
        let column = view.columns.get(status);
        out.push_str(&format!("\n{} ({})\n", status.to_string().to_uppercase(), column.len()));
        for task in column {
            out.push_str(&format!("  {}\n", task_line(task)));
        }
    }

    let title_of = |id: &Uuid| {
        view.columns
            .get(TaskStatus::Todo)
            .iter()
            .chain(view.columns.get(TaskStatus::Done))
            .find(|t| t.id == *id)
            .map_or_else(|| id.to_string(), |t| t.title.clone())
    };
    out.push_str("\nReady:\n");
    if view.ready.is_empty() {
        out.push_str("  (none)\n");
    }
    for id in &view.ready {
        out.push_str(&format!("  - {}\n", title_of(id)));
    }
    if !view.needs_review.is_empty() {
        out.push_str("\nNeeds review:\n");
        for id in &view.needs_review {
            out.push_str(&format!("  - {}\n", title_of(id)));
        }
    }
    out
}

fn task_line(task: &TaskNode) -> String {
    let mut line = format!("[{}] {} ({:.1}h)", task.order_index, task.title, task.effort_hours);
    if let Some(reason) = task.state.blocked_reason() {
        line.push_str(&format!(" <{reason}>"));
    }
    line.push_str(&format!("  {}", task.id));
    line
}
