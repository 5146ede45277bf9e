//! Parsing of ids and board states given on the command line.

use anyhow::{Context, Result};
use uuid::Uuid;

use planboard_core::TaskState;
use planboard_db::models::{BlockedReason, TaskStatus};

/// Parse a project or task id, naming `what` in the error.
pub fn parse_id(what: &str, input: &str) -> Result<Uuid> {
    Uuid::parse_str(input.trim()).with_context(|| format!("invalid {what} ID: {input:?}"))
}

/// Parse a board column name.
pub fn parse_status(input: &str) -> Result<TaskStatus> {
    input
        .trim()
        .to_ascii_lowercase()
        .parse::<TaskStatus>()
        .with_context(|| format!("expected one of todo, doing, done, blocked; got {input:?}"))
}

/// Parse a requested task state. A bare `blocked` is a manual block, since
/// dependency blocks are never requested by hand.
pub fn parse_state(input: &str) -> Result<TaskState> {
    let status = parse_status(input)?;
    Ok(TaskState::from_parts(
        status,
        (status == TaskStatus::Blocked).then_some(BlockedReason::Manual),
    ))
}
