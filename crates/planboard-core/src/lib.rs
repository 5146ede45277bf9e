//! Planning core: turns a goal and a time budget into a validated,
//! dependency-aware plan, and keeps the resulting task graph consistent
//! under board moves.

pub mod board;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod plan;
pub mod service;
pub mod state;
pub mod store;

pub use error::{ErrorKind, PlanboardError, Result, Violation};
pub use graph::{TaskGraph, TaskNode, TaskState};
pub use service::BoardService;
