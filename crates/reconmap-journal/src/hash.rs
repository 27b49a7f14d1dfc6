//! BLAKE3 content hashing for tamper evidence.

use serde::Serialize;

use crate::{EntryId, JournalEntry, Outcome};

/// Hashable view of a journal entry (excludes content_hash).
#[derive(Serialize)]
struct HashableEntry<'a> {
    id: &'a EntryId,
    scan_id: &'a Option<String>,
    target: &'a str,
    mode: &'a reconmap_core::ScanMode,
    outcome: &'a Outcome,
    hosts: u32,
    findings: u32,
    error: &'a Option<String>,
    started_at: &'a chrono::DateTime<chrono::Utc>,
    finished_at: &'a chrono::DateTime<chrono::Utc>,
}

/// Serialize every field except `content_hash` to JSON and hash the bytes.
/// Returns the hex-encoded hash.
pub fn compute_entry_hash(entry: &JournalEntry) -> String {
    let hashable = HashableEntry {
        id: &entry.id,
        scan_id: &entry.scan_id,
        target: &entry.target,
        mode: &entry.mode,
        outcome: &entry.outcome,
        hosts: entry.hosts,
        findings: entry.findings,
        error: &entry.error,
        started_at: &entry.started_at,
        finished_at: &entry.finished_at,
    };

    let mut hasher = blake3::Hasher::new();
    if serde_json::to_writer(&mut hasher, &hashable).is_err() {
        tracing::warn!(entry_id = %entry.id, "Journal entry serialization failed while hashing");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use reconmap_core::ScanMode;

    use super::*;

    #[test]
    fn hash_is_stable_and_ignores_content_hash() {
        let entry = JournalEntry::completed("abc", "10.0.0.5", ScanMode::Quick, 1, 1, Utc::now());
        let h1 = compute_entry_hash(&entry);
        let sealed = entry.clone().finalize();
        assert_eq!(h1, compute_entry_hash(&sealed));
        assert_eq!(h1.len(), 64);
    }
}
