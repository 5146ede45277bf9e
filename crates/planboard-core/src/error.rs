//! Error taxonomy shared by every planboard operation.
//!
//! Each [`PlanboardError`] maps to exactly one [`ErrorKind`], which is what
//! callers branch on (HTTP status, retry policy, user-facing message).

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::graph::TaskState;
use crate::plan::PlanValidationError;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad caller input. Nothing was read from or written to collaborators.
    InvalidRequest,
    /// The model collaborator failed, timed out, or returned nothing.
    /// Retryable by the caller.
    UpstreamUnavailable,
    /// Model output contained no parseable JSON.
    MalformedResponse,
    /// A dependency cycle, either in model output or in a requested edge.
    CyclicDependency,
    /// Model output parsed but violated the plan schema.
    ValidationError,
    /// Completing a task whose dependencies are not all done.
    UnmetDependency,
    /// A status move absent from the transition table.
    InvalidTransition,
    /// Unknown project or task.
    NotFound,
    /// Another writer committed first. Retryable by the caller.
    Conflict,
    /// The caller abandoned an ingestion before it committed.
    Cancelled,
    /// The storage collaborator failed.
    PersistenceFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::MalformedResponse => "malformed_response",
            Self::CyclicDependency => "cyclic_dependency",
            Self::ValidationError => "validation_error",
            Self::UnmetDependency => "unmet_dependency",
            Self::InvalidTransition => "invalid_transition",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
            Self::PersistenceFailure => "persistence_failure",
        };
        f.write_str(s)
    }
}

/// A single schema violation, addressed by a JSON-path-like field path such
/// as `milestones[0].tasks[2].effort_hours`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Errors returned by the planning core.
#[derive(Debug, Error)]
pub enum PlanboardError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("model unavailable: {message}")]
    UpstreamUnavailable { message: String, timed_out: bool },

    #[error(transparent)]
    InvalidPlan(#[from] PlanValidationError),

    #[error("dependency cycle: {}", format_ids(.cycle, " -> "))]
    CyclicDependency { cycle: Vec<Uuid> },

    #[error("task {task_id} cannot be done: dependencies not done: {}", format_ids(.unmet, ", "))]
    UnmetDependency { task_id: Uuid, unmet: Vec<Uuid> },

    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskState,
        to: TaskState,
    },

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: Uuid },

    #[error("project {project_id} was modified concurrently (expected version {expected})")]
    Conflict { project_id: Uuid, expected: i64 },

    #[error("ingestion cancelled before commit")]
    Cancelled,

    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl PlanboardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::InvalidPlan(e) => e.kind(),
            Self::CyclicDependency { .. } => ErrorKind::CyclicDependency,
            Self::UnmetDependency { .. } => ErrorKind::UnmetDependency,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Field-level detail, empty for errors that are not about model output.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::InvalidPlan(e) => e.violations(),
            _ => &[],
        }
    }

    pub(crate) fn task_not_found(id: Uuid) -> Self {
        Self::NotFound { what: "task", id }
    }

    pub(crate) fn project_not_found(id: Uuid) -> Self {
        Self::NotFound { what: "project", id }
    }
}

fn format_ids(ids: &[Uuid], sep: &str) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(sep)
}

pub type Result<T, E = PlanboardError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(ErrorKind::UpstreamUnavailable.to_string(), "upstream_unavailable");
        assert_eq!(
            serde_json::to_string(&ErrorKind::UnmetDependency).unwrap(),
            "\"unmet_dependency\""
        );
    }

    #[test]
    fn persistence_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("failed to insert task");
        let err = PlanboardError::Persistence(inner);
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
        assert_eq!(
            err.to_string(),
            "persistence failure: failed to insert task: connection reset"
        );
    }

    #[test]
    fn unmet_dependency_lists_ids() {
        let dep = Uuid::nil();
        let err = PlanboardError::UnmetDependency {
            task_id: Uuid::nil(),
            unmet: vec![dep],
        };
        assert!(err.to_string().contains(&dep.to_string()));
        assert!(err.violations().is_empty());
    }
}
