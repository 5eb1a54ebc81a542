//! `pipeflow-scheduler` — the evaluation loop.
//!
//! Every tick the engine loads the active schedules, asks the pure
//! due-time evaluator which should fire now, and hands those to a
//! [`Dispatcher`]. Execution itself lives in `pipeflow-runner`; this
//! crate only decides *when*.

pub mod due;
pub mod engine;
pub mod error;

pub use due::is_due;
pub use engine::{Dispatcher, SchedulerEngine};
pub use error::{Result, SchedulerError};
