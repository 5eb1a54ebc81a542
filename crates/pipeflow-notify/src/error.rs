use thiserror::Error;

/// Transport-level delivery failures. These never cross the
/// [`crate::Notifier`] boundary — they exist so the channel modules can
/// use `?` internally before the top-level send logs and swallows.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email error: {0}")]
    Email(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
