//! Persistence layer for planboard: row models, connection pooling,
//! embedded migrations, and per-table query functions.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
