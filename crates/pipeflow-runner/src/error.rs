use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The schedule cannot be turned into a launchable command line.
    #[error("invocation error: {0}")]
    Invocation(String),

    #[error(transparent)]
    Store(#[from] pipeflow_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
