use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use domain::score::entity::ScoreRecord;
use domain::score::error::ScoreError;
use ports::secondary::score_store::ScoreStore;

/// redb table: key = IP text, value = JSON-serialized `StoredScore`.
const SCORE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("ip_scores");

/// Records per write transaction for bulk upserts. Keeps individual
/// transactions small so a large snapshot import never holds the write
/// path for long.
const BULK_BATCH_SIZE: usize = 333;

#[derive(Serialize, Deserialize)]
struct StoredScore {
    score: i32,
    updated_at: DateTime<Utc>,
}

/// Persistent per-IP score mirror backed by redb.
///
/// Single writer: all mutations serialize through `write_lock`, matching
/// the store's single-writer consistency requirement.
pub struct RedbScoreStore {
    db: Database,
    write_lock: Mutex<()>,
}

impl RedbScoreStore {
    /// Open (or create) the score database at `path`.
    pub fn open(path: &Path) -> Result<Self, ScoreError> {
        let db = Database::create(path)
            .map_err(|e| ScoreError::Store(format!("redb open failed: {e}")))?;

        // Ensure the table exists.
        let txn = db
            .begin_write()
            .map_err(|e| ScoreError::Store(format!("redb txn begin: {e}")))?;
        {
            let _table = txn
                .open_table(SCORE_TABLE)
                .map_err(|e| ScoreError::Store(format!("redb table create: {e}")))?;
        }
        txn.commit()
            .map_err(|e| ScoreError::Store(format!("redb commit: {e}")))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn write_batch(&self, batch: &[ScoreRecord]) -> Result<(), ScoreError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| ScoreError::Store(format!("redb write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(SCORE_TABLE)
                .map_err(|e| ScoreError::Store(format!("redb write table: {e}")))?;
            for record in batch {
                let value = serde_json::to_vec(&StoredScore {
                    score: record.score,
                    updated_at: record.updated_at,
                })
                .map_err(|e| ScoreError::Encoding(e.to_string()))?;
                table
                    .insert(record.ip.as_str(), value.as_slice())
                    .map_err(|e| ScoreError::Store(format!("redb insert: {e}")))?;
            }
        }
        txn.commit()
            .map_err(|e| ScoreError::Store(format!("redb write commit: {e}")))?;
        Ok(())
    }

    /// Number of stored records.
    pub fn record_count(&self) -> Result<usize, ScoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| ScoreError::Store(format!("redb count txn: {e}")))?;
        let table = txn
            .open_table(SCORE_TABLE)
            .map_err(|e| ScoreError::Store(format!("redb count table: {e}")))?;
        let count = redb::ReadableTableMetadata::len(&table)
            .map_err(|e| ScoreError::Store(format!("redb count: {e}")))?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(count as usize)
    }
}

impl ScoreStore for RedbScoreStore {
    fn get(&self, ip: &str) -> Result<Option<ScoreRecord>, ScoreError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| ScoreError::Store(format!("redb read txn: {e}")))?;
        let table = txn
            .open_table(SCORE_TABLE)
            .map_err(|e| ScoreError::Store(format!("redb read table: {e}")))?;

        let result = table
            .get(ip)
            .map_err(|e| ScoreError::Store(format!("redb get: {e}")))?;

        match result {
            Some(guard) => {
                let stored: StoredScore = serde_json::from_slice(guard.value())
                    .map_err(|e| ScoreError::Encoding(e.to_string()))?;
                Ok(Some(ScoreRecord {
                    ip: ip.to_string(),
                    score: stored.score,
                    updated_at: stored.updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn upsert(&self, record: &ScoreRecord) -> Result<(), ScoreError> {
        let _lock = self
            .write_lock
            .lock()
            .map_err(|e| ScoreError::Store(format!("lock poisoned: {e}")))?;
        self.write_batch(std::slice::from_ref(record))
    }

    fn bulk_upsert(&self, records: &[ScoreRecord]) -> Result<(), ScoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let _lock = self
            .write_lock
            .lock()
            .map_err(|e| ScoreError::Store(format!("lock poisoned: {e}")))?;
        for batch in records.chunks(BULK_BATCH_SIZE) {
            self.write_batch(batch)?;
        }
        Ok(())
    }
}
