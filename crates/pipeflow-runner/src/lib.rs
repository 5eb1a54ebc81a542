//! `pipeflow-runner` — turns a schedule row into a supervised child
//! process: command-line resolution per tool, merged output streaming
//! into the shared daily log, error-marker scanning, wall-clock
//! enforcement, result persistence and failure notifications.

pub mod adapter;
pub mod error;
pub mod log;
pub mod runner;
pub mod types;

pub use adapter::build_invocation;
pub use error::{Result, RunnerError};
pub use log::DailyLog;
pub use runner::JobRunner;
pub use types::{ExecutionResult, Invocation, Outcome};
