//! Scan backend client.

use async_trait::async_trait;
use tokio::sync::broadcast;

use reconmap_core::events::ReconEvent;
use reconmap_core::types::ScanHistoryPage;
use reconmap_core::{ReconConfig, ReconError, Result, ScanAccepted, ScanRequest, ScanStatusSnapshot};

use crate::auth::{AuthContext, AuthHandle};
use crate::health::HealthMonitor;
use crate::transport::HttpTransport;

/// What the lifecycle controller needs from a scan backend.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    /// Submit a scan; resolves once the backend has accepted it.
    async fn submit(&self, request: &ScanRequest) -> Result<ScanAccepted>;

    /// Fetch the current status of a submitted scan.
    async fn fetch_status(&self, scan_id: &str) -> Result<ScanStatusSnapshot>;

    /// Last known backend reachability.
    fn is_reachable(&self) -> bool;
}

/// HTTP client for the scan backend, gated by a [`HealthMonitor`].
#[derive(Debug, Clone)]
pub struct ScanClient {
    transport: HttpTransport,
    health: HealthMonitor,
}

impl ScanClient {
    pub fn new(transport: HttpTransport, health: HealthMonitor) -> Self {
        Self { transport, health }
    }

    /// Build the transport and health monitor from configuration. A configured
    /// `auth_token` seeds the auth context.
    pub fn from_config(
        config: &ReconConfig,
        events: Option<broadcast::Sender<ReconEvent>>,
    ) -> Result<Self> {
        let auth = match &config.auth_token {
            Some(token) => AuthHandle::new(AuthContext::bearer(token.clone())),
            None => AuthHandle::default(),
        };
        let transport = HttpTransport::new(config, auth)?;
        let health = HealthMonitor::new(&config.base_url, &config.health, events)?;
        Ok(Self::new(transport, health))
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Validate and submit a scan.
    ///
    /// Refuses without touching the network when the health monitor reports
    /// the backend unreachable, and schedules a fresh probe instead.
    pub async fn submit(&self, request: &ScanRequest) -> Result<ScanAccepted> {
        request.validate()?;

        if !self.health.is_reachable() {
            tracing::warn!(
                target_spec = %request.target,
                base_url = %self.transport.base_url(),
                "Scan backend marked unreachable, not submitting"
            );
            self.health.refresh();
            return Err(ReconError::Transport {
                message: format!("scan backend at {} is unreachable", self.transport.base_url()),
                attempts: 0,
            });
        }

        let accepted: ScanAccepted = self
            .transport
            .post_json(request.mode.endpoint(), request)
            .await?;

        tracing::info!(
            scan_id = %accepted.scan_id,
            target_spec = %request.target,
            mode = %request.mode,
            "Scan accepted"
        );

        Ok(accepted)
    }

    pub async fn fetch_status(&self, scan_id: &str) -> Result<ScanStatusSnapshot> {
        self.transport.get_json(&format!("/scan/{scan_id}")).await
    }

    /// Recent scans known to the backend, newest first.
    pub async fn history(&self, limit: u32, skip: u32) -> Result<ScanHistoryPage> {
        self.transport
            .get_json(&format!("/scan/history?limit={limit}&skip={skip}"))
            .await
    }
}

#[async_trait]
impl ScanBackend for ScanClient {
    async fn submit(&self, request: &ScanRequest) -> Result<ScanAccepted> {
        ScanClient::submit(self, request).await
    }

    async fn fetch_status(&self, scan_id: &str) -> Result<ScanStatusSnapshot> {
        ScanClient::fetch_status(self, scan_id).await
    }

    fn is_reachable(&self) -> bool {
        self.health.is_reachable()
    }
}

#[cfg(test)]
mod tests {
    use reconmap_core::{ScanMode, ValidationError};

    use super::*;

    #[tokio::test]
    async fn test_invalid_request_rejected_locally() {
        let client = ScanClient::from_config(&ReconConfig::default(), None).unwrap();

        let err = client
            .submit(&ScanRequest::new("", ScanMode::Quick))
            .await
            .unwrap_err();
        assert_eq!(err, ReconError::Validation(ValidationError::MissingTarget));

        let err = client
            .submit(&ScanRequest::new("10.0.0.5", ScanMode::Custom))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReconError::Validation(ValidationError::CustomOptionsMissing)
        );
    }
}
