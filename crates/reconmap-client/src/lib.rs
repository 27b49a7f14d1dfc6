//! reconmap-client: HTTP access to the scan backend.
//!
//! All calls go through one retrying [`HttpTransport`]. The [`HealthMonitor`]
//! tracks backend liveness on its own schedule, and [`ScanClient`] refuses
//! to submit while the backend is known to be down.

pub mod auth;
pub mod client;
pub mod health;
pub mod transport;

pub use auth::{AuthContext, AuthHandle};
pub use client::{ScanBackend, ScanClient};
pub use health::HealthMonitor;
pub use transport::{with_retry, HttpTransport, RetryPolicy};
