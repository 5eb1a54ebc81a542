use thiserror::Error;

/// Errors that can occur within the schedule store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No schedule with the given ID exists in the store.
    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: i64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;
