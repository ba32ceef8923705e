use thiserror::Error;

/// Errors from the reputation score store.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("store error: {0}")]
    Store(String),

    #[error("record encoding failed: {0}")]
    Encoding(String),
}
