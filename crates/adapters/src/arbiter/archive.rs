use std::io::Read;

use chrono::Utc;
use flate2::read::GzDecoder;
use serde::Deserialize;
use tar::Archive;

use domain::arbiter::error::ArbiterError;
use domain::score::entity::ScoreRecord;

/// One entry of a score snapshot file: the archive carries JSON arrays of
/// these, without timestamps — a snapshot row counts as current.
#[derive(Deserialize)]
struct SnapshotRecord {
    ip: String,
    #[serde(rename = "nfg_score")]
    score: i32,
}

/// Decode a gzip-compressed tar archive of JSON score files.
///
/// Non-regular entries are skipped; a file that fails to parse is logged
/// and skipped while the remaining files still load. A corrupt archive
/// (gzip or tar framing) fails the whole decode.
pub fn decode_score_archive(body: &[u8]) -> Result<Vec<ScoreRecord>, ArbiterError> {
    let gz = GzDecoder::new(body);
    let mut archive = Archive::new(gz);
    let now = Utc::now();
    let mut records = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| ArbiterError::Decode(format!("tar read failed: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArbiterError::Decode(format!("tar entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<unnamed>".to_string());

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| ArbiterError::Decode(format!("tar file '{name}' read: {e}")))?;

        match serde_json::from_slice::<Vec<SnapshotRecord>>(&data) {
            Ok(parsed) => {
                records.extend(parsed.into_iter().map(|r| ScoreRecord {
                    ip: r.ip,
                    score: r.score,
                    updated_at: now,
                }));
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e,
                    "skipping malformed snapshot file");
            }
        }
    }

    Ok(records)
}
