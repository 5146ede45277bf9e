//! Query functions, one module per table.
//!
//! Write helpers are generic over [`sqlx::PgExecutor`] so callers can run
//! them against the pool or inside a transaction (`&mut *tx`).

pub mod milestones;
pub mod projects;
pub mod tasks;
