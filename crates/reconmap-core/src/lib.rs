//! reconmap-core: Shared types, configuration, and error handling for reconmap.
//!
//! This crate provides the foundational types used across all reconmap components:
//! - Scan requests, modes, and backend status snapshots
//! - Raw host/port records reported by the scan backend
//! - Graph entities (nodes, edges, vulnerability findings)
//! - Event types for health and lifecycle notifications
//! - Configuration management
//! - The error taxonomy shared by client, controller, and CLI

pub mod config;
pub mod error;
pub mod events;
pub mod types;
pub mod validate;

pub use config::ReconConfig;
pub use error::{ReconError, Result, ValidationError};
pub use types::{
    EdgeData, HostRecord, NodeData, NodeId, NodeType, PortRecord, PortState, Protocol,
    ScanAccepted, ScanMode, ScanRequest, ScanResult, ScanStatus, ScanStatusSnapshot, Severity,
    TranslatedTopology, VulnerabilityFinding,
};
