//! sqlx/Postgres models and repositories for the cocho ETL store.
//!
//! One repository struct per table, stateless, with associated async
//! functions over `&PgPool`. Status columns are SMALLINT ids matching
//! the seeded lookup tables; the enums live in [`models::status`].

pub mod models;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, health_check, run_migrations};
