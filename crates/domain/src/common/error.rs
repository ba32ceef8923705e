use thiserror::Error;

use crate::arbiter::error::ArbiterError;
use crate::score::error::ScoreError;

/// Umbrella error for application-level operations that cross module
/// boundaries (sync orchestration, update dispatch).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Arbiter(#[from] ArbiterError),
}
