//! Validated plan shape produced from model output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Violation};

/// A plan that has passed validation: milestones and tasks in response
/// order, effort clamped, every reference resolved to another task's key,
/// and no dependency cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub milestones: Vec<PlannedMilestone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedMilestone {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub tasks: Vec<PlannedTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    /// Response-local reference: the task's `id` if the model gave one,
    /// otherwise its title. Unique within the plan.
    pub key: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub effort_hours: f64,
    /// Keys of the tasks this one depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Plan {
    pub fn tasks(&self) -> impl Iterator<Item = &PlannedTask> {
        self.milestones.iter().flat_map(|m| m.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.milestones.iter().map(|m| m.tasks.len()).sum()
    }

    pub fn total_effort_hours(&self) -> f64 {
        self.tasks().map(|t| t.effort_hours).sum()
    }
}

/// Model output that could not be turned into a [`Plan`].
///
/// Always carries at least one violation, so callers can feed the list back
/// to the model or show it field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanValidationError {
    kind: ErrorKind,
    violations: Vec<Violation>,
}

impl PlanValidationError {
    /// No JSON could be recovered from the text.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            violations: vec![Violation::new("$", reason)],
        }
    }

    /// The JSON parsed but broke the schema.
    pub fn invalid(violations: Vec<Violation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self {
            kind: ErrorKind::ValidationError,
            violations,
        }
    }

    /// The dependency references form a cycle.
    pub fn cyclic(violation: Violation) -> Self {
        Self {
            kind: ErrorKind::CyclicDependency,
            violations: vec![violation],
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for PlanValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::MalformedResponse => "model response is not JSON",
            ErrorKind::CyclicDependency => "plan has a dependency cycle",
            _ => "plan failed validation",
        };
        write!(f, "{what}")?;
        for (i, v) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PlanValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_violation() {
        let err = PlanValidationError::invalid(vec![
            Violation::new("milestones[0].name", "must not be empty"),
            Violation::new("milestones[0].tasks[1].effort_hours", "must be positive"),
        ]);
        assert_eq!(
            err.to_string(),
            "plan failed validation: milestones[0].name: must not be empty; \
             milestones[0].tasks[1].effort_hours: must be positive"
        );
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn totals() {
        let plan = Plan {
            milestones: vec![PlannedMilestone {
                name: "m".into(),
                summary: None,
                tasks: vec![
                    PlannedTask {
                        key: "a".into(),
                        title: "a".into(),
                        description: None,
                        effort_hours: 2.0,
                        depends_on: vec![],
                    },
                    PlannedTask {
                        key: "b".into(),
                        title: "b".into(),
                        description: None,
                        effort_hours: 3.5,
                        depends_on: vec!["a".into()],
                    },
                ],
            }],
        };
        assert_eq!(plan.task_count(), 2);
        assert_eq!(plan.total_effort_hours(), 5.5);
    }
}
