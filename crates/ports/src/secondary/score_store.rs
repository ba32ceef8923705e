use domain::score::entity::ScoreRecord;
use domain::score::error::ScoreError;

/// Secondary port for the persistent per-IP score mirror.
///
/// Implementations serialize writes internally; callers may invoke these
/// from any task. Lookups for unknown IPs return `Ok(None)`, not an error.
pub trait ScoreStore: Send + Sync {
    /// Point lookup by canonical IP text.
    fn get(&self, ip: &str) -> Result<Option<ScoreRecord>, ScoreError>;

    /// Insert or replace a single record.
    fn upsert(&self, record: &ScoreRecord) -> Result<(), ScoreError>;

    /// Insert or replace many records. Implementations partition large
    /// inputs into bounded write transactions.
    fn bulk_upsert(&self, records: &[ScoreRecord]) -> Result<(), ScoreError>;
}
