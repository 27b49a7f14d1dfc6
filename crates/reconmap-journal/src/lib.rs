//! reconmap-journal: tamper-evident scan history.
//!
//! Every scan job that reaches a terminal state can be written down as a
//! journal entry: what was scanned, how it ended, and what it found. Each
//! entry is content-hashed with BLAKE3 on finalization so later edits are
//! detectable, and stored as JSON under a date-partitioned directory.

pub mod hash;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reconmap_core::ScanMode;

pub use store::{FileJournalStore, JournalError, JournalQuery, JournalStore};

/// Unique identifier for a journal entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a journaled scan ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Failed,
}

/// A finished scan job as recorded in the journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: EntryId,
    /// Backend-assigned scan ID. Absent when submission itself failed.
    pub scan_id: Option<String>,
    pub target: String,
    pub mode: ScanMode,
    pub outcome: Outcome,
    /// Hosts merged into the topology.
    pub hosts: u32,
    /// Heuristic findings across those hosts.
    pub findings: u32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// BLAKE3 content hash (hex), set on finalization.
    pub content_hash: Option<String>,
}

impl JournalEntry {
    /// Record a successful scan.
    pub fn completed(
        scan_id: &str,
        target: &str,
        mode: ScanMode,
        hosts: u32,
        findings: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            scan_id: Some(scan_id.to_string()),
            target: target.to_string(),
            mode,
            outcome: Outcome::Completed,
            hosts,
            findings,
            error: None,
            started_at,
            finished_at: Utc::now(),
            content_hash: None,
        }
    }

    /// Record a failed scan.
    pub fn failed(
        scan_id: Option<&str>,
        target: &str,
        mode: ScanMode,
        error: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            scan_id: scan_id.map(String::from),
            target: target.to_string(),
            mode,
            outcome: Outcome::Failed,
            hosts: 0,
            findings: 0,
            error: Some(error.to_string()),
            started_at,
            finished_at: Utc::now(),
            content_hash: None,
        }
    }

    /// Seal the entry by computing its content hash.
    pub fn finalize(mut self) -> Self {
        self.content_hash = Some(self.compute_hash());
        self
    }

    /// Compute the BLAKE3 hash of the entry's content.
    /// The hash covers all fields except `content_hash` itself.
    pub fn compute_hash(&self) -> String {
        hash::compute_entry_hash(self)
    }

    /// Verify that the stored content_hash matches a freshly computed hash.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_sets_verifiable_hash() {
        let entry = JournalEntry::completed("abc", "10.0.0.0/24", ScanMode::Quick, 3, 2, Utc::now())
            .finalize();
        assert!(entry.content_hash.is_some());
        assert!(entry.verify_integrity());
    }

    #[test]
    fn tampering_breaks_integrity() {
        let mut entry =
            JournalEntry::failed(None, "10.0.0.5", ScanMode::Full, "nmap not found", Utc::now())
                .finalize();
        entry.error = Some("edited".to_string());
        assert!(!entry.verify_integrity());
    }

    #[test]
    fn unfinalized_entry_does_not_verify() {
        let entry = JournalEntry::completed("abc", "10.0.0.5", ScanMode::Quick, 1, 0, Utc::now());
        assert!(!entry.verify_integrity());
    }
}
