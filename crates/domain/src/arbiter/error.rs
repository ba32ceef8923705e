use thiserror::Error;

/// Errors from talking to the arbiter, HTTP or WebSocket.
///
/// `RateLimited` is deliberately its own variant: submissions hitting a
/// 429 are never retried in place, they go to the retry queue instead.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("rate limit exceeded (429): {message}")]
    RateLimited { message: String },

    #[error("transport failure after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    #[error("server error {status} persisted after retries")]
    Server { status: u16 },

    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to decode arbiter response: {0}")]
    Decode(String),
}

impl ArbiterError {
    /// True for a 429 response; the caller should enqueue for retry
    /// instead of surfacing the error.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
