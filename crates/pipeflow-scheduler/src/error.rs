use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] pipeflow_store::StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
