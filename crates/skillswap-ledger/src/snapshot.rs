use std::path::Path;

use serde::Deserialize;

use crate::error::SourceError;
use crate::memory::InMemoryLedger;
use crate::types::ParticipantRecord;

#[derive(Debug, Deserialize)]
struct Snapshot {
    participants: Vec<ParticipantRecord>,
}

/// Parse a participant snapshot (`{"participants": [...]}`).
///
/// # Errors
///
/// Returns an error if the JSON is malformed.
pub fn parse_snapshot(json: &str) -> Result<Vec<ParticipantRecord>, SourceError> {
    let snapshot: Snapshot = serde_json::from_str(json)?;
    Ok(snapshot.participants)
}

/// Load a snapshot file into `ledger`. A missing file seeds nothing.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed, or if it
/// contains duplicate participants.
pub fn seed_from_file(ledger: &InMemoryLedger, path: &Path) -> Result<usize, SourceError> {
    if !path.exists() {
        tracing::info!("no ledger snapshot at {}, starting empty", path.display());
        return Ok(0);
    }
    let content = std::fs::read_to_string(path)?;
    let records = parse_snapshot(&content)?;
    let count = records.len();
    ledger.seed(records)?;
    tracing::info!("seeded {count} participants from {}", path.display());
    Ok(count)
}
