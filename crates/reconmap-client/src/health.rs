//! Periodic backend liveness probing.
//!
//! The monitor keeps one boolean, "is the scan backend reachable", starting
//! optimistic. A background task re-probes on a fixed interval. At most one
//! probe is in flight; a tick that lands while a probe is outstanding is
//! skipped. State flips are logged and published as banner events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use reconmap_core::config::HealthConfig;
use reconmap_core::events::{EventPayload, EventSource, ReconEvent};
use reconmap_core::{ReconError, Result};

/// Shared liveness monitor. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    url: String,
    interval: Duration,
    state: watch::Sender<bool>,
    in_flight: AtomicBool,
    events: Option<broadcast::Sender<ReconEvent>>,
    task: Mutex<Option<CancellationToken>>,
}

/// Clears the in-flight flag even when a probe future is dropped mid-request.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HealthMonitor {
    /// Create a monitor for `base_url`. Nothing is probed until [`start`] or
    /// [`probe`] is called.
    ///
    /// [`start`]: HealthMonitor::start
    /// [`probe`]: HealthMonitor::probe
    pub fn new(
        base_url: &str,
        config: &HealthConfig,
        events: Option<broadcast::Sender<ReconEvent>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ReconError::Config(format!("failed to build health client: {e}")))?;

        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            config.path.trim_start_matches('/')
        );
        let (state, _) = watch::channel(true);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                url,
                interval: config.interval(),
                state,
                in_flight: AtomicBool::new(false),
                events,
                task: Mutex::new(None),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Last known reachability.
    pub fn is_reachable(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Watch reachability changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    /// Probe the liveness endpoint once and record the result.
    ///
    /// If another probe is already outstanding this returns the last known
    /// state without issuing a request. Never fails: any error counts as
    /// unreachable.
    pub async fn probe(&self) -> bool {
        if self.inner.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(url = %self.inner.url, "Health probe already in flight, skipping");
            return self.is_reachable();
        }
        let _guard = InFlightGuard(&self.inner.in_flight);

        let reachable = self.request_liveness().await;
        self.record(reachable);
        reachable
    }

    /// Fire a one-off probe in the background.
    pub fn refresh(&self) {
        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.probe().await;
        });
    }

    /// Start periodic probing. The first probe runs immediately. Calling
    /// `start` on a running monitor is a no-op.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let token = CancellationToken::new();
        *task = Some(token.clone());

        let monitor = self.clone();
        let interval = self.inner.interval;
        tracing::info!(
            url = %self.inner.url,
            interval_secs = interval.as_secs(),
            "Health monitor started"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = monitor.probe() => {}
                        }
                    }
                }
            }

            tracing::debug!(url = %monitor.inner.url, "Health monitor stopped");
        });
    }

    /// Stop periodic probing. Safe to call when not running.
    pub fn stop(&self) {
        let token = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn request_liveness(&self) -> bool {
        match self.inner.client.get(&self.inner.url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    url = %self.inner.url,
                    status = response.status().as_u16(),
                    "Health probe returned non-success status"
                );
                false
            }
            Err(e) => {
                tracing::warn!(url = %self.inner.url, error = %e, "Health probe failed");
                false
            }
        }
    }

    fn record(&self, reachable: bool) {
        let previous = self.inner.state.send_replace(reachable);
        if previous == reachable {
            return;
        }

        let url = self.inner.url.clone();
        let payload = if reachable {
            tracing::info!(url = %url, "Scan backend reachable again");
            EventPayload::BackendRestored { url }
        } else {
            tracing::warn!(url = %url, "Scan backend unreachable");
            EventPayload::BackendUnreachable { url }
        };

        if let Some(events) = &self.inner.events {
            // No subscribers is fine.
            let _ = events.send(ReconEvent::new(EventSource::Health, payload));
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("url", &self.inner.url)
            .field("reachable", &self.is_reachable())
            .finish()
    }
}
