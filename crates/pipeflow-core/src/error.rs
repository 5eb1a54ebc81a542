use thiserror::Error;

/// Errors raised while resolving the daemon's configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup precondition failed: {0}")]
    Precondition(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
