//! Core domain types for reconmap.
//!
//! Three groups live here: the request/status types exchanged with the scan
//! backend, the raw host records it reports, and the graph entities the
//! translator derives from them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::validate;

// ── Scan Modes ────────────────────────────────────────────────────

/// Scan modes supported by the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Common ports only.
    #[default]
    Quick,
    /// All ports, OS and version detection.
    Full,
    /// User-supplied ports and/or raw arguments.
    Custom,
}

/// One row of the mode lookup table.
#[derive(Debug, Clone, Copy)]
pub struct ModeRule {
    pub mode: ScanMode,
    /// Submission endpoint relative to the backend base URL.
    pub endpoint: &'static str,
    /// Whether the request must carry ports or arguments.
    pub requires_options: bool,
    /// Arguments the backend runs for this mode, when fixed.
    pub backend_args: Option<&'static str>,
}

const MODE_RULES: [ModeRule; 3] = [
    ModeRule {
        mode: ScanMode::Quick,
        endpoint: "/scan/quick",
        requires_options: false,
        backend_args: Some("-sT -T4 -F --open -p 21,22,23,25,53,80,110,139,443,445,3306,3389,8080"),
    },
    ModeRule {
        mode: ScanMode::Full,
        endpoint: "/scan/full",
        requires_options: false,
        backend_args: Some("-sT -sV -O -A --osscan-guess --version-all"),
    },
    ModeRule {
        mode: ScanMode::Custom,
        endpoint: "/scan/custom",
        requires_options: true,
        backend_args: None,
    },
];

impl ScanMode {
    pub const ALL: [ScanMode; 3] = [ScanMode::Quick, ScanMode::Full, ScanMode::Custom];

    /// Look up this mode's rule row.
    pub fn rule(&self) -> &'static ModeRule {
        let idx = match self {
            Self::Quick => 0,
            Self::Full => 1,
            Self::Custom => 2,
        };
        &MODE_RULES[idx]
    }

    pub fn endpoint(&self) -> &'static str {
        self.rule().endpoint
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Full => "full",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "full" => Ok(Self::Full),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Invalid scan mode: {s}. Choose: quick, full, custom")),
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────

/// An immutable scan submission. Serializes to the backend's POST body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanRequest {
    pub target: String,
    pub mode: ScanMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            target: target.into().trim().to_string(),
            mode,
            ports: None,
            arguments: None,
        }
    }

    pub fn with_ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = non_empty(ports.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = non_empty(arguments.into());
        self
    }

    /// Validate the request locally. Nothing invalid is ever sent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::validate_target(&self.target)?;

        let has_ports = self.ports.as_deref().is_some_and(|p| !p.trim().is_empty());
        let has_args = self
            .arguments
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty());

        if self.mode.rule().requires_options && !has_ports && !has_args {
            return Err(ValidationError::CustomOptionsMissing);
        }

        if has_ports {
            if let Some(ports) = &self.ports {
                validate::parse_port_spec(ports)?;
            }
        }

        Ok(())
    }

    /// The arguments the backend will run for this request.
    pub fn effective_arguments(&self) -> Option<String> {
        if let Some(args) = self.mode.rule().backend_args {
            return Some(args.to_string());
        }
        match (&self.arguments, &self.ports) {
            (Some(args), _) => Some(args.clone()),
            (None, Some(ports)) => Some(format!("-sT -p {ports}")),
            (None, None) => None,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ── Backend Status ────────────────────────────────────────────────

/// Status of a job as reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Acknowledgement returned when the backend accepts a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanAccepted {
    pub scan_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<ScanStatus>,
}

/// Snapshot returned by `GET /scan/{scan_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanStatusSnapshot {
    pub scan_id: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub mode: Option<ScanMode>,
    pub status: ScanStatus,
    /// UNIX seconds.
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub result: Option<ScanResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One row of the backend's scan history listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanHistoryEntry {
    #[serde(rename = "_id", alias = "scan_id")]
    pub scan_id: String,
    pub target: String,
    pub mode: ScanMode,
    pub status: ScanStatus,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A page of backend scan history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanHistoryPage {
    #[serde(default)]
    pub scans: Vec<ScanHistoryEntry>,
    #[serde(default)]
    pub count: u64,
}

// ── Raw Results ───────────────────────────────────────────────────

/// Raw result payload of a completed scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    #[serde(default)]
    pub scan_info: serde_json::Value,
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
}

/// A host as reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub ip: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub mac: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub mac_vendor: Option<String>,
    #[serde(default, alias = "osGuess")]
    pub os: Option<OsGuess>,
    #[serde(default)]
    pub ports: Vec<PortRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub scripts: Vec<ScriptOutput>,
    #[serde(default)]
    pub uptime: Option<Uptime>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub distance: Option<u64>,
    #[serde(default)]
    pub tcp_sequence: Option<TcpSequence>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub last_scan_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OsGuess {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub accuracy: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptOutput {
    pub name: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Uptime {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub seconds: Option<u64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub last_boot: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcpSequence {
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub difficulty: String,
}

/// A single port observation on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortRecord {
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    pub state: PortState,
    #[serde(default)]
    pub service: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub version: Option<String>,
}

impl PortRecord {
    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

fn default_protocol() -> Protocol {
    Protocol::Tcp
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Tcp,
    Udp,
    Other(String),
}

impl From<String> for Protocol {
    fn from(proto: String) -> Self {
        match proto.to_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "udp" => Self::Udp,
            _ => Self::Other(proto),
        }
    }
}

impl From<Protocol> for String {
    fn from(proto: Protocol) -> Self {
        match proto {
            Protocol::Tcp => "tcp".to_string(),
            Protocol::Udp => "udp".to_string(),
            Protocol::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl From<String> for PortState {
    fn from(state: String) -> Self {
        match state.to_lowercase().as_str() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            _ => Self::Filtered,
        }
    }
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
        }
    }
}

impl From<PortState> for String {
    fn from(state: PortState) -> Self {
        state.as_str().to_string()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// nmap reports some counters as strings; accept either form.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    Ok(match Option::<NumOrString>::deserialize(deserializer)? {
        Some(NumOrString::Num(n)) => Some(n),
        Some(NumOrString::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Graph Entities ────────────────────────────────────────────────

/// Namespace UUID for deterministic node IDs.
const RECONMAP_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x5e, 0x72, 0x8a, 0x4b, 0x4d, 0x0e, 0x9c, 0x21, 0x6d, 0xe3, 0x55, 0x0a, 0x7b, 0x19,
]);

/// Identifier of a node in the topology graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Derive the node ID for a host IP. The same IP always yields the same ID.
    pub fn for_ip(ip: &str) -> Self {
        Self(Uuid::new_v5(&RECONMAP_NS, format!("host:{ip}").as_bytes()))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Best-effort device classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Host,
    Router,
    Switch,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Router => "router",
            Self::Switch => "switch",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A heuristic finding attached to a node. Never sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VulnerabilityFinding {
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
}

/// A displayable graph node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Read-only back-reference to the host this node was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_host: Option<Arc<HostRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<VulnerabilityFinding>>,
}

impl NodeData {
    pub fn findings(&self) -> &[VulnerabilityFinding] {
        self.vulnerabilities.as_deref().unwrap_or(&[])
    }

    /// Highest severity among this node's findings.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings().iter().map(|f| f.severity).max()
    }
}

/// An undirected edge. Endpoints are stored in sorted order so `(a, b) == (b, a)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeData {
    a: NodeId,
    b: NodeId,
}

impl EdgeData {
    pub fn new(x: NodeId, y: NodeId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.a, self.b)
    }

    pub fn touches(&self, id: &NodeId) -> bool {
        self.a == *id || self.b == *id
    }
}

/// Output of the result translator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedTopology {
    pub nodes: Vec<NodeData>,
    pub edges: Vec<EdgeData>,
}

impl TranslatedTopology {
    pub fn finding_count(&self) -> usize {
        self.nodes.iter().map(|n| n.findings().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_rules() {
        assert_eq!(ScanMode::Quick.endpoint(), "/scan/quick");
        assert_eq!(ScanMode::Full.endpoint(), "/scan/full");
        assert_eq!(ScanMode::Custom.endpoint(), "/scan/custom");
        assert!(ScanMode::Custom.rule().requires_options);
        assert!(!ScanMode::Quick.rule().requires_options);
        for mode in ScanMode::ALL {
            assert_eq!(mode.rule().mode, mode);
        }
    }

    #[test]
    fn test_non_custom_requests_validate() {
        for mode in [ScanMode::Quick, ScanMode::Full] {
            for target in ["10.0.0.5", "10.0.0.0/24", "example.com"] {
                assert!(ScanRequest::new(target, mode).validate().is_ok());
            }
        }
    }

    #[test]
    fn test_custom_requires_ports_or_arguments() {
        let req = ScanRequest::new("10.0.0.5", ScanMode::Custom);
        assert_eq!(req.validate(), Err(ValidationError::CustomOptionsMissing));

        let req = ScanRequest::new("10.0.0.5", ScanMode::Custom)
            .with_ports("  ")
            .with_arguments("");
        assert_eq!(req.validate(), Err(ValidationError::CustomOptionsMissing));

        let req = ScanRequest::new("10.0.0.5", ScanMode::Custom).with_ports("22,80");
        assert!(req.validate().is_ok());
        assert_eq!(req.effective_arguments().as_deref(), Some("-sT -p 22,80"));

        let req = ScanRequest::new("10.0.0.5", ScanMode::Custom).with_arguments("-sU -p 53");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_body_omits_empty_fields() {
        let req = ScanRequest::new("10.0.0.5", ScanMode::Quick);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"target": "10.0.0.5", "mode": "quick"})
        );
    }

    #[test]
    fn test_host_record_from_backend_json() {
        let json = serde_json::json!({
            "hostname": "",
            "state": "up",
            "ip": "10.0.0.5",
            "mac": "",
            "macVendor": "",
            "ports": [
                {"port": 22, "protocol": "tcp", "state": "open", "service": "ssh",
                 "product": "OpenSSH", "version": ""},
                {"port": 53, "protocol": "udp", "state": "open|filtered", "service": "domain",
                 "product": "", "version": ""}
            ],
            "os": {"name": "Linux 5.15", "accuracy": 95, "version": "5.X"},
            "scripts": [],
            "uptime": null,
            "distance": null,
            "tcpSequence": null,
            "lastScanTime": "2026-10-18 10:00:00"
        });

        let host: HostRecord = serde_json::from_value(json).unwrap();
        assert_eq!(host.ip, "10.0.0.5");
        assert_eq!(host.hostname, None);
        assert_eq!(host.mac, None);
        assert_eq!(host.ports.len(), 2);
        assert_eq!(host.ports[0].product.as_deref(), Some("OpenSSH"));
        assert_eq!(host.ports[0].version, None);
        assert_eq!(host.ports[1].protocol, Protocol::Udp);
        assert_eq!(host.ports[1].state, PortState::Filtered);
        assert_eq!(host.os.as_ref().unwrap().accuracy, Some(95));
    }

    #[test]
    fn test_node_id_is_deterministic() {
        assert_eq!(NodeId::for_ip("10.0.0.5"), NodeId::for_ip("10.0.0.5"));
        assert_ne!(NodeId::for_ip("10.0.0.5"), NodeId::for_ip("10.0.0.6"));
    }

    #[test]
    fn test_edge_is_unordered() {
        let a = NodeId::for_ip("10.0.0.1");
        let b = NodeId::for_ip("10.0.0.2");
        assert_eq!(EdgeData::new(a, b), EdgeData::new(b, a));
        assert!(EdgeData::new(a, b).touches(&b));
    }

    #[test]
    fn test_snapshot_without_result() {
        let json = r#"{"scan_id":"abc","target":"10.0.0.5","mode":"quick",
                       "status":"running","start_time":1760000000.5}"#;
        let snap: ScanStatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.status, ScanStatus::Running);
        assert!(!snap.status.is_terminal());
        assert!(snap.result.is_none());
    }
}
