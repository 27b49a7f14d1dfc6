//! Journal helpers for finished scan jobs.

use std::sync::Arc;

use reconmap_journal::{FileJournalStore, JournalEntry, JournalStore};

use crate::job::{ScanJob, ScanPhase};

/// Open the file journal at `dir`, if configured. Failure to open is logged
/// and disables journaling.
pub fn open(dir: Option<&str>) -> Option<Arc<dyn JournalStore>> {
    let dir = dir?;
    match FileJournalStore::new(dir) {
        Ok(store) => {
            tracing::info!(journal_dir = %dir, "Scan journal enabled");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(journal_dir = %dir, error = %e, "Failed to open scan journal, journaling disabled");
            None
        }
    }
}

/// Build the journal entry for a terminal job.
pub fn entry_for(job: &ScanJob) -> Option<JournalEntry> {
    let target = &job.request.target;
    let mode = job.request.mode;

    let entry = match job.phase {
        ScanPhase::Completed => JournalEntry::completed(
            job.scan_id.as_deref().unwrap_or_default(),
            target,
            mode,
            job.hosts as u32,
            job.findings as u32,
            job.started_at,
        ),
        ScanPhase::Failed => {
            let error = job
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            JournalEntry::failed(job.scan_id.as_deref(), target, mode, &error, job.started_at)
        }
        _ => return None,
    };

    Some(entry.finalize())
}

/// Record a terminal job. Errors are logged, never raised.
pub fn record(journal: &dyn JournalStore, job: &ScanJob) {
    let Some(entry) = entry_for(job) else {
        return;
    };

    match journal.save(&entry) {
        Ok(()) => tracing::info!(
            entry_id = %entry.id,
            scan_id = ?job.scan_id,
            outcome = ?entry.outcome,
            "Scan recorded in journal"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to record scan in journal"),
    }
}
