//! reconmap-scan: scan orchestration for the reconmap client.
//!
//! Submits scans to the backend, polls them to completion, merges the
//! results into the topology graph, and records each finished job in the
//! local journal.

pub mod controller;
pub mod job;
pub mod journal;
pub mod view;

pub use controller::ScanController;
pub use job::{ScanJob, ScanPhase};
pub use view::ScanView;
