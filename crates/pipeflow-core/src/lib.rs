//! `pipeflow-core` — shared configuration and error types for the
//! Pipeflow scheduler daemon.
//!
//! Everything environment-derived (store path, tool install paths,
//! notification channels, loop timings) is resolved here, once, into a
//! [`config::PipeflowConfig`] that the other crates receive by value.
//! No execution-path code reads the environment directly.

pub mod config;
pub mod error;

pub use config::{NotifyConfig, PipeflowConfig, SchedulerConfig, ToolPaths};
pub use error::{CoreError, Result};
