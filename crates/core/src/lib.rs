//! Pure domain logic for the cocho feedlot ETL engine.
//!
//! This crate has zero internal deps (no DB, no async, no I/O) so the
//! db, etl and worker crates — and any future CLI tooling — can all
//! depend on it.

pub mod backoff;
pub mod classify;
pub mod error;
pub mod health;
pub mod heuristics;
pub mod lifecycle;
pub mod natural_key;
pub mod run_log;
pub mod types;
