//! Journal storage: the trait and a file-system implementation.
//!
//! Entries are stored as JSON files organized by finish date and entry ID.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{EntryId, JournalEntry, Outcome};

/// Errors that can occur during journal storage operations.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Journal entry not found: {0}")]
    NotFound(EntryId),

    #[error("Integrity check failed for journal entry {0}: stored hash does not match content")]
    IntegrityViolation(EntryId),

    #[error("Journal entry has no content hash (not finalized)")]
    NotFinalized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filters for listing journal entries.
#[derive(Debug, Default)]
pub struct JournalQuery {
    /// Only entries for this exact target.
    pub target: Option<String>,
    /// Only entries with this outcome.
    pub outcome: Option<Outcome>,
    /// Cap on returned entries (newest first).
    pub limit: Option<usize>,
}

/// Trait for journal persistence backends.
pub trait JournalStore: Send + Sync {
    /// Store a finalized entry. Returns an error if the entry has no content hash.
    fn save(&self, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Retrieve an entry by ID, verifying integrity.
    fn get(&self, id: EntryId) -> Result<JournalEntry, JournalError>;

    /// List entries matching the query, ordered by finished_at descending.
    fn list(&self, query: &JournalQuery) -> Result<Vec<JournalEntry>, JournalError> {
        let mut results: Vec<JournalEntry> = entry_files(&self.root)?
            .iter()
            .filter_map(|path| load_listed(path))
            .filter(|entry| matches_query(entry, query))
            .collect();

        results.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}

fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }

    None
}

/// Every `.json` file below `root`, in no particular order.
fn entry_files(root: &Path) -> Result<Vec<PathBuf>, JournalError> {
    let mut files = Vec::new();
    if !root.is_dir() {
        return Ok(files);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Load one file for listing. Unreadable, malformed and tampered files are
/// skipped so a single bad entry never hides the rest of the history.
fn load_listed(path: &Path) -> Option<JournalEntry> {
    let parsed = fs::read_to_string(path)
        .map_err(JournalError::from)
        .and_then(|raw| serde_json::from_str::<JournalEntry>(&raw).map_err(JournalError::from));

    let entry = match parsed {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable journal entry");
            return None;
        }
    };

    if !entry.verify_integrity() {
        tracing::warn!(
            entry_id = %entry.id,
            path = %path.display(),
            "Skipping journal entry with broken integrity"
        );
        return None;
    }

    Some(entry)
}

fn matches_query(entry: &JournalEntry, query: &JournalQuery) -> bool {
    if let Some(target) = &query.target {
        if &entry.target != target {
            return false;
        }
    }
    if let Some(outcome) = &query.outcome {
        if &entry.outcome != outcome {
            return false;
        }
    }
    true
}
