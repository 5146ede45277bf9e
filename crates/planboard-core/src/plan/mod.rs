//! Plan schema, validation, prompts, materialization, and ingestion.

pub mod ingest;
pub mod materialize;
pub mod prompt;
pub mod schema;
pub mod validate;

pub use ingest::{IngestRequest, PlanIngestor};
pub use materialize::{MaterializedPlan, materialize};
pub use prompt::{SYSTEM_PROMPT, repair_prompt, user_prompt};
pub use schema::{Plan, PlanValidationError, PlannedMilestone, PlannedTask};
pub use validate::{coerce_effort, extract_json, parse_candidate, validate, validate_value};
