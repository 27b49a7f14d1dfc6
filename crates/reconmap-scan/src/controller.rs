//! Scan lifecycle controller.
//!
//! Drives one job at a time through
//! `Idle → Submitting → Polling → Completed | Failed`.
//!
//! State lives behind a short-held mutex that is never held across an await.
//! Every submission bumps a generation counter; responses carrying an older
//! generation are dropped before they touch state. At most one poll task
//! runs, and it is cancelled by `discard`, `shutdown`, or dropping the
//! controller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use reconmap_client::ScanBackend;
use reconmap_core::config::PollConfig;
use reconmap_core::events::{EventPayload, EventSource, ReconEvent};
use reconmap_core::{
    ReconError, Result, ScanRequest, ScanStatus, ScanStatusSnapshot, ValidationError,
};
use reconmap_journal::JournalStore;
use reconmap_topology::{translate, GraphStore};

use crate::job::{ScanJob, ScanPhase};
use crate::journal;

/// Owns the current scan job and its poll task.
pub struct ScanController {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Arc<dyn ScanBackend>,
    store: Arc<GraphStore>,
    poll: PollConfig,
    events: broadcast::Sender<ReconEvent>,
    journal: Option<Arc<dyn JournalStore>>,
    state: Mutex<ControllerState>,
    phase: watch::Sender<ScanPhase>,
}

#[derive(Default)]
struct ControllerState {
    job: Option<ScanJob>,
    generation: u64,
    poll_cancel: Option<CancellationToken>,
    closed: bool,
}

impl ControllerState {
    fn phase(&self) -> ScanPhase {
        self.job.as_ref().map_or(ScanPhase::Idle, |job| job.phase)
    }

    fn stop_polling(&mut self) {
        if let Some(token) = self.poll_cancel.take() {
            token.cancel();
        }
    }

    /// Drop the job and invalidate anything still in flight for it.
    fn discard(&mut self) {
        self.stop_polling();
        self.generation += 1;
        self.job = None;
    }
}

enum PollOutcome {
    Status(Result<ScanStatusSnapshot>),
    TimedOut,
}

impl ScanController {
    pub fn new(
        backend: Arc<dyn ScanBackend>,
        store: Arc<GraphStore>,
        poll: PollConfig,
        events: broadcast::Sender<ReconEvent>,
        journal: Option<Arc<dyn JournalStore>>,
    ) -> Self {
        let (phase, _) = watch::channel(ScanPhase::Idle);
        Self {
            shared: Arc::new(Shared {
                backend,
                store,
                poll,
                events,
                journal,
                state: Mutex::new(ControllerState::default()),
                phase,
            }),
        }
    }

    /// Submit a scan and start polling it. Returns the backend scan ID.
    ///
    /// Rejected without a transition when the request is invalid or a job
    /// already exists (active, or terminal and not yet reset). A submission
    /// error moves the job to `Failed` and is also returned.
    pub async fn submit(&self, request: ScanRequest) -> Result<String> {
        request.validate()?;

        let generation = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ReconError::Cancelled);
            }
            let phase = state.phase();
            if phase != ScanPhase::Idle {
                return Err(ValidationError::ScanInProgress {
                    phase: phase.to_string(),
                }
                .into());
            }

            state.stop_polling();
            state.generation += 1;
            state.job = Some(ScanJob::new(request.clone()));
            self.shared.set_phase(ScanPhase::Submitting);
            state.generation
        };

        tracing::info!(
            target_spec = %request.target,
            mode = %request.mode,
            generation,
            "Submitting scan"
        );

        let outcome = self.shared.backend.submit(&request).await;

        let (result, finished) = {
            let mut state = self.shared.lock();
            if state.generation != generation {
                tracing::debug!(generation, "Dropping submit response for a discarded job");
                return Err(ReconError::Cancelled);
            }

            match outcome {
                Ok(accepted) if accepted.scan_id.trim().is_empty() => {
                    let error = ReconError::Decode("backend accepted the scan without a scan_id".to_string());
                    let finished = self.shared.finish(&mut state, ScanPhase::Failed, Some(error.clone()));
                    (Err(error), finished)
                }
                Ok(accepted) => {
                    let scan_id = accepted.scan_id;
                    if let Some(job) = state.job.as_mut() {
                        job.scan_id = Some(scan_id.clone());
                        job.backend_status = accepted.status;
                        job.phase = ScanPhase::Polling;
                    }

                    let token = CancellationToken::new();
                    state.poll_cancel = Some(token.clone());
                    self.shared.set_phase(ScanPhase::Polling);
                    self.shared.publish(EventPayload::ScanSubmitted {
                        scan_id: scan_id.clone(),
                        target: request.target.clone(),
                        mode: request.mode,
                    });

                    tokio::spawn(poll_loop(
                        self.shared.clone(),
                        generation,
                        scan_id.clone(),
                        token,
                    ));

                    tracing::info!(scan_id = %scan_id, "Scan accepted, polling for status");
                    (Ok(scan_id), None)
                }
                Err(e) => {
                    let finished = self.shared.finish(&mut state, ScanPhase::Failed, Some(e.clone()));
                    (Err(e), finished)
                }
            }
        };

        self.shared.record(finished);
        result
    }

    /// Return to `Idle` from a terminal phase. A no-op when already idle.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.shared.lock();
        let phase = state.phase();

        if phase.is_active() {
            return Err(ReconError::InvalidTransition {
                action: "reset".to_string(),
                phase: phase.to_string(),
            });
        }
        if phase == ScanPhase::Idle {
            return Ok(());
        }

        state.discard();
        self.shared.set_phase(ScanPhase::Idle);
        tracing::info!(from = %phase, "Scan job reset");
        Ok(())
    }

    /// Abandon the current job from any phase, cancelling its polling.
    pub fn discard(&self) {
        let mut state = self.shared.lock();
        let phase = state.phase();
        state.discard();
        self.shared.set_phase(ScanPhase::Idle);

        if phase != ScanPhase::Idle {
            tracing::info!(from = %phase, "Scan job discarded");
        }
    }

    /// Cancel polling, discard the job, and refuse further submissions.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.discard();
        self.shared.set_phase(ScanPhase::Idle);
        tracing::debug!("Scan controller shut down");
    }

    pub fn phase(&self) -> ScanPhase {
        *self.shared.phase.borrow()
    }

    /// Snapshot of the current job.
    pub fn job(&self) -> Option<ScanJob> {
        self.shared.lock().job.clone()
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.shared.store
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ScanPhase> {
        self.shared.phase.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ReconEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until no request is outstanding and return the phase reached:
    /// `Completed`, `Failed`, or `Idle` if the job was discarded.
    pub async fn wait_for_terminal(&self) -> ScanPhase {
        let mut rx = self.shared.phase.subscribe();
        let reached = rx.wait_for(|phase| !phase.is_active()).await.map(|p| *p);
        reached.unwrap_or_else(|_| *rx.borrow())
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.phase.send_replace(phase);
    }

    fn publish(&self, payload: EventPayload) {
        // No subscribers is fine.
        let _ = self.events.send(ReconEvent::new(EventSource::Lifecycle, payload));
    }

    /// Move the job to a terminal phase. Returns a snapshot for the journal.
    fn finish(
        &self,
        state: &mut ControllerState,
        phase: ScanPhase,
        error: Option<ReconError>,
    ) -> Option<ScanJob> {
        state.stop_polling();
        let job = state.job.as_mut()?;
        job.finish(phase, error.clone());

        let payload = match error {
            None => {
                tracing::info!(
                    scan_id = ?job.scan_id,
                    hosts = job.hosts,
                    findings = job.findings,
                    polls = job.polls,
                    duration_ms = job.elapsed_ms(),
                    "Scan completed"
                );
                EventPayload::ScanCompleted {
                    scan_id: job.scan_id.clone().unwrap_or_default(),
                    hosts: job.hosts as u32,
                    findings: job.findings as u32,
                    duration_ms: job.elapsed_ms(),
                }
            }
            Some(e) => {
                tracing::warn!(scan_id = ?job.scan_id, error = %e, "Scan failed");
                EventPayload::ScanFailed {
                    scan_id: job.scan_id.clone(),
                    hint: e.hint().map(String::from),
                    error: e.to_string(),
                }
            }
        };

        let snapshot = job.clone();
        self.set_phase(phase);
        self.publish(payload);
        Some(snapshot)
    }

    fn record(&self, finished: Option<ScanJob>) {
        if let (Some(journal), Some(job)) = (&self.journal, finished) {
            journal::record(journal.as_ref(), &job);
        }
    }

    /// Apply one poll outcome. Returns whether polling should continue.
    fn apply(&self, generation: u64, outcome: PollOutcome) -> bool {
        let (keep_polling, finished) = {
            let mut state = self.lock();
            if state.generation != generation || state.phase() != ScanPhase::Polling {
                tracing::debug!(generation, "Dropping poll response for a superseded job");
                return false;
            }
            self.apply_locked(&mut state, outcome)
        };

        self.record(finished);
        keep_polling
    }

    fn apply_locked(
        &self,
        state: &mut ControllerState,
        outcome: PollOutcome,
    ) -> (bool, Option<ScanJob>) {
        let scan_id = state
            .job
            .as_ref()
            .and_then(|job| job.scan_id.clone())
            .unwrap_or_default();

        match outcome {
            PollOutcome::TimedOut => {
                let error = ReconError::PollTimeout {
                    scan_id,
                    max_secs: self.poll.max_duration_secs,
                };
                (false, self.finish(state, ScanPhase::Failed, Some(error)))
            }
            PollOutcome::Status(Ok(snapshot)) => self.apply_snapshot(state, snapshot),
            PollOutcome::Status(Err(e)) if e.is_transport() => {
                if self.backend.is_reachable() {
                    tracing::warn!(scan_id = %scan_id, error = %e, "Status poll failed, retrying on next tick");
                    (true, None)
                } else {
                    (false, self.finish(state, ScanPhase::Failed, Some(e)))
                }
            }
            PollOutcome::Status(Err(e)) => (false, self.finish(state, ScanPhase::Failed, Some(e))),
        }
    }

    fn apply_snapshot(
        &self,
        state: &mut ControllerState,
        snapshot: ScanStatusSnapshot,
    ) -> (bool, Option<ScanJob>) {
        let Some(job) = state.job.as_mut() else {
            return (false, None);
        };
        job.polls += 1;
        job.backend_status = Some(snapshot.status);

        match snapshot.status {
            ScanStatus::Pending | ScanStatus::Running => {
                tracing::debug!(
                    scan_id = %snapshot.scan_id,
                    status = ?snapshot.status,
                    polls = job.polls,
                    "Scan still in progress"
                );
                let payload = EventPayload::ScanProgress {
                    scan_id: snapshot.scan_id,
                    status: snapshot.status,
                    elapsed_ms: job.elapsed_ms(),
                };
                self.publish(payload);
                (true, None)
            }
            ScanStatus::Completed => {
                let result = snapshot.result.unwrap_or_default();
                let topology = translate(&result);
                job.hosts = topology.nodes.len();
                job.findings = topology.finding_count();
                job.result = Some(Arc::new(result));

                self.store.merge_with_edges(topology.nodes, topology.edges);
                (false, self.finish(state, ScanPhase::Completed, None))
            }
            ScanStatus::Failed => {
                let message = snapshot
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "scan failed without an error message".to_string());
                let error = ReconError::job_failure(message);
                (false, self.finish(state, ScanPhase::Failed, Some(error)))
            }
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, generation: u64, scan_id: String, cancel: CancellationToken) {
    let every = shared.poll.interval();
    let deadline = shared.poll.max_duration().map(|max| Instant::now() + max);
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            shared.apply(generation, PollOutcome::TimedOut);
            break;
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => break,
            response = shared.backend.fetch_status(&scan_id) => response,
        };

        if !shared.apply(generation, PollOutcome::Status(response)) {
            break;
        }
    }

    tracing::debug!(scan_id = %scan_id, generation, "Poll loop exited");
}
