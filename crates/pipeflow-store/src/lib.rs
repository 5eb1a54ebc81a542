//! `pipeflow-store` — SQLite-backed schedule store.
//!
//! One row per workflow definition. The daemon performs exactly two
//! kinds of access: read all active rows at the start of an evaluation
//! pass, and write back the two execution-result fields after a run.
//! Rows are created and edited by external front ends; this crate only
//! needs the schema to exist (`db::init_db` is idempotent).

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::ScheduleStore;
pub use types::{Schedule, ScheduleStatus, Tool};
