//! ETL orchestration and consistency engine for feedlot CSV exports.
//!
//! The engine sequences parse -> validate -> resolve -> upsert ->
//! finalize per uploaded file, driving the lifecycle state machine and
//! wrapping fallible storage steps with the retry executor. Everything
//! persistent goes through the store ports in [`store`], so the engine
//! runs against Postgres in production ([`pg::PgStore`]) and against
//! in-memory doubles in tests ([`testing::MemStore`]).

pub mod alert;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod orchestrator;
pub mod pg;
pub mod ports;
pub mod resolver;
pub mod retry;
pub mod store;
pub mod testing;
pub mod upsert;
