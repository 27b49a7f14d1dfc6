//! The scan view: everything that lives while a topology screen is mounted.
//!
//! Mounting starts the health monitor and the renderer and creates the
//! lifecycle controller. Unmounting (or dropping the view) stops all three,
//! so no timer or poll task outlives the view.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use reconmap_client::{HealthMonitor, ScanClient};
use reconmap_core::events::{EventPayload, ReconEvent};
use reconmap_core::{ReconConfig, Result, ScanRequest};
use reconmap_journal::JournalStore;
use reconmap_topology::{
    GraphRenderer, GraphStore, LayoutKind, NodeSelectCallback, RendererHandle, Surface,
};

use crate::controller::ScanController;
use crate::journal;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Banner text shown while the backend is unreachable.
pub fn unreachable_banner(url: &str) -> String {
    format!("Scan server unreachable at {url}. Scans are paused until it answers again.")
}

/// A mounted scan view.
pub struct ScanView {
    health: HealthMonitor,
    controller: ScanController,
    renderer: Option<RendererHandle>,
    events: broadcast::Sender<ReconEvent>,
    banner: watch::Receiver<Option<String>>,
    banner_task: CancellationToken,
}

impl ScanView {
    /// Build the client, store and journal from configuration and mount.
    pub fn mount<S>(
        config: &ReconConfig,
        surface: S,
        layout: LayoutKind,
        on_node_select: NodeSelectCallback,
    ) -> Result<Self>
    where
        S: Surface + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let client = ScanClient::from_config(config, Some(events.clone()))?;
        let journal = journal::open(config.journal_dir.as_deref());

        Ok(Self::mount_with(
            client,
            Arc::new(GraphStore::new()),
            events,
            config,
            journal,
            surface,
            layout,
            on_node_select,
        ))
    }

    /// Mount around an existing client and store. `events` must be the
    /// sender the client's health monitor publishes on.
    #[allow(clippy::too_many_arguments)]
    pub fn mount_with<S>(
        client: ScanClient,
        store: Arc<GraphStore>,
        events: broadcast::Sender<ReconEvent>,
        config: &ReconConfig,
        journal: Option<Arc<dyn JournalStore>>,
        surface: S,
        layout: LayoutKind,
        on_node_select: NodeSelectCallback,
    ) -> Self
    where
        S: Surface + 'static,
    {
        let health = client.health().clone();
        let (banner_tx, banner) = watch::channel(None);
        let banner_task = CancellationToken::new();
        spawn_banner_task(
            events.subscribe(),
            banner_tx,
            banner_task.clone(),
            health.clone(),
        );

        let renderer = GraphRenderer::spawn(store.clone(), surface, layout, on_node_select);
        let controller = ScanController::new(
            Arc::new(client),
            store,
            config.poll.clone(),
            events.clone(),
            journal,
        );
        health.start();

        tracing::info!(health_url = %health.url(), "Scan view mounted");

        Self {
            health,
            controller,
            renderer: Some(renderer),
            events,
            banner,
            banner_task,
        }
    }

    /// Submit a scan through the controller.
    pub async fn submit(&self, request: ScanRequest) -> Result<String> {
        self.controller.submit(request).await
    }

    pub fn controller(&self) -> &ScanController {
        &self.controller
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        self.controller.store()
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Current banner text, if any.
    pub fn banner(&self) -> Option<String> {
        self.banner.borrow().clone()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<Option<String>> {
        self.banner.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ReconEvent> {
        self.events.subscribe()
    }

    /// Select the node with this IP as if it had been tapped. Returns
    /// `false` when no such node is displayed.
    pub fn select_ip(&self, ip: &str) -> bool {
        let Some(id) = self.store().snapshot().find_by_ip(ip).map(|n| n.id) else {
            return false;
        };
        match &self.renderer {
            Some(renderer) => {
                renderer.tap_node(id);
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.tap_canvas();
        }
    }

    pub fn set_layout(&self, layout: LayoutKind) {
        if let Some(renderer) = &self.renderer {
            renderer.set_layout(layout);
        }
    }

    /// Stop the health monitor, the poll task and the renderer.
    pub async fn unmount(mut self) {
        self.stop_timers();
        if let Some(renderer) = self.renderer.take() {
            renderer.shutdown().await;
        }
        tracing::info!("Scan view unmounted");
    }

    fn stop_timers(&self) {
        self.health.stop();
        self.controller.shutdown();
        self.banner_task.cancel();
    }
}

impl Drop for ScanView {
    fn drop(&mut self) {
        self.stop_timers();
        if let Some(renderer) = &self.renderer {
            renderer.stop();
        }
    }
}

fn banner_for(health: &HealthMonitor) -> Option<String> {
    (!health.is_reachable()).then(|| unreachable_banner(health.url()))
}

fn spawn_banner_task(
    mut events: broadcast::Receiver<ReconEvent>,
    banner: watch::Sender<Option<String>>,
    cancel: CancellationToken,
    health: HealthMonitor,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => match event.payload {
                    EventPayload::BackendUnreachable { url } => {
                        banner.send_replace(Some(unreachable_banner(&url)));
                    }
                    EventPayload::BackendRestored { .. } => {
                        banner.send_replace(None);
                    }
                    _ => {}
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // A flip may have been among the skipped events.
                    tracing::debug!(skipped, "Banner listener lagged, resyncing from health state");
                    banner.send_replace(banner_for(&health));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
