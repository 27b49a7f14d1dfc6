//! Scan job state as seen by the lifecycle controller.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use reconmap_core::{ReconError, ScanRequest, ScanResult, ScanStatus};

/// Lifecycle phase of the current job. `Idle` means there is no job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl ScanPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// A request is outstanding with the backend.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Submitting | Self::Polling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scan from submission to its terminal state.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub request: ScanRequest,
    /// Assigned by the backend on acceptance.
    pub scan_id: Option<String>,
    pub phase: ScanPhase,
    /// Last status the backend reported.
    pub backend_status: Option<ScanStatus>,
    /// Status responses received so far.
    pub polls: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<Arc<ScanResult>>,
    /// Hosts merged into the topology on completion.
    pub hosts: usize,
    pub findings: usize,
    pub error: Option<ReconError>,
}

impl ScanJob {
    pub(crate) fn new(request: ScanRequest) -> Self {
        Self {
            request,
            scan_id: None,
            phase: ScanPhase::Submitting,
            backend_status: None,
            polls: 0,
            started_at: Utc::now(),
            ended_at: None,
            result: None,
            hosts: 0,
            findings: 0,
            error: None,
        }
    }

    /// Wall-clock time since submission, or total time once finished.
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    pub(crate) fn finish(&mut self, phase: ScanPhase, error: Option<ReconError>) {
        self.phase = phase;
        self.error = error;
        self.ended_at = Some(Utc::now());
    }
}
