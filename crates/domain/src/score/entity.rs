use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A per-IP reputation record as held by the local mirror.
///
/// `updated_at` is the source-of-truth timestamp of the score, not the
/// local write time; decay is computed against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub ip: String,
    pub score: i32,
    pub updated_at: DateTime<Utc>,
}

impl ScoreRecord {
    pub fn new(ip: impl Into<String>, score: i32, updated_at: DateTime<Utc>) -> Self {
        Self {
            ip: ip.into(),
            score,
            updated_at,
        }
    }
}

/// An incremental score change, pushed over the update channel or pulled
/// from the incremental feed. A missing timestamp means "now".
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreUpdate {
    pub ip: String,
    pub score: i32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScoreUpdate {
    /// Convert into a store record, substituting `now` for a missing or
    /// future timestamp so a fresh push never starts pre-decayed.
    pub fn into_record(self, now: DateTime<Utc>) -> ScoreRecord {
        let updated_at = match self.timestamp {
            Some(ts) if ts <= now => ts,
            _ => now,
        };
        ScoreRecord {
            ip: self.ip,
            score: self.score,
            updated_at,
        }
    }
}
