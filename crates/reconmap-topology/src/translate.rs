//! Scan result → topology translation.
//!
//! Pure functions: no I/O, no clock. Node IDs are derived from the host IP,
//! so rescanning a host maps onto the same node.

use std::collections::HashMap;
use std::sync::Arc;

use reconmap_core::{HostRecord, NodeData, NodeId, NodeType, ScanResult, TranslatedTopology};

use crate::vulns::detect_vulnerabilities;

/// Routing protocols and remote-access gateways: BGP, RIP, PPTP, RADIUS.
const ROUTER_PORTS: [u16; 4] = [179, 520, 1723, 1812];
/// DHCP server/client.
const SWITCH_PORTS: [u16; 2] = [67, 68];

/// Classify a host by the ports it reports. A port counts regardless of its
/// state; router ports take precedence over switch ports.
pub fn classify(host: &HostRecord) -> NodeType {
    let has_any = |set: &[u16]| host.ports.iter().any(|p| set.contains(&p.port));

    if has_any(&ROUTER_PORTS) {
        NodeType::Router
    } else if has_any(&SWITCH_PORTS) {
        NodeType::Switch
    } else {
        NodeType::Host
    }
}

/// Convert one host record into a graph node. Returns `None` for records
/// without an IP.
pub fn host_to_node(host: &HostRecord) -> Option<NodeData> {
    let ip = host.ip.trim();
    if ip.is_empty() {
        return None;
    }

    let findings = detect_vulnerabilities(host);
    let name = host
        .hostname
        .clone()
        .unwrap_or_else(|| ip.to_string());

    Some(NodeData {
        id: NodeId::for_ip(ip),
        node_type: classify(host),
        name,
        ip: Some(ip.to_string()),
        source_host: Some(Arc::new(host.clone())),
        vulnerabilities: (!findings.is_empty()).then_some(findings),
    })
}

/// Translate a completed scan into nodes. No edges are inferred.
///
/// If the backend reports the same IP twice, the later record wins.
pub fn translate(result: &ScanResult) -> TranslatedTopology {
    let mut nodes: Vec<NodeData> = Vec::with_capacity(result.hosts.len());
    let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(result.hosts.len());
    let mut skipped = 0usize;

    for host in &result.hosts {
        let Some(node) = host_to_node(host) else {
            skipped += 1;
            continue;
        };

        match index.get(&node.id) {
            Some(&i) => nodes[i] = node,
            None => {
                index.insert(node.id, nodes.len());
                nodes.push(node);
            }
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, "Skipped host records without an IP");
    }

    TranslatedTopology {
        nodes,
        edges: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use reconmap_core::{PortRecord, PortState, Protocol, Severity};

    use super::*;

    fn port(number: u16, state: PortState) -> PortRecord {
        PortRecord {
            port: number,
            protocol: Protocol::Tcp,
            state,
            service: String::new(),
            product: None,
            version: None,
        }
    }

    fn host(ip: &str, ports: &[(u16, PortState)]) -> HostRecord {
        HostRecord {
            ip: ip.to_string(),
            ports: ports.iter().map(|&(n, s)| port(n, s)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_classification_precedence() {
        use PortState::*;
        assert_eq!(classify(&host("a", &[(80, Open)])), NodeType::Host);
        assert_eq!(classify(&host("a", &[(67, Open)])), NodeType::Switch);
        assert_eq!(classify(&host("a", &[(68, Closed)])), NodeType::Switch);
        assert_eq!(classify(&host("a", &[(1812, Filtered)])), NodeType::Router);
        assert_eq!(
            classify(&host("a", &[(67, Open), (179, Open)])),
            NodeType::Router
        );
        assert_eq!(classify(&host("a", &[])), NodeType::Host);
    }

    #[test]
    fn test_node_fields() {
        let mut record = host("10.0.0.1", &[(23, PortState::Open), (520, PortState::Open)]);
        record.hostname = Some("core-rtr".to_string());

        let node = host_to_node(&record).unwrap();
        assert_eq!(node.id, NodeId::for_ip("10.0.0.1"));
        assert_eq!(node.name, "core-rtr");
        assert_eq!(node.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(node.node_type, NodeType::Router);
        assert_eq!(node.max_severity(), Some(Severity::High));
        assert_eq!(node.source_host.as_deref(), Some(&record));
    }

    #[test]
    fn test_name_falls_back_to_ip_and_findings_omitted() {
        let node = host_to_node(&host("10.0.0.9", &[(443, PortState::Open)])).unwrap();
        assert_eq!(node.name, "10.0.0.9");
        assert!(node.vulnerabilities.is_none());
    }

    #[test]
    fn test_translate_skips_empty_ip_and_dedupes() {
        let mut renamed = host("10.0.0.2", &[]);
        renamed.hostname = Some("second".to_string());

        let result = ScanResult {
            scan_info: serde_json::Value::Null,
            hosts: vec![
                host("10.0.0.2", &[]),
                host("", &[(22, PortState::Open)]),
                host("10.0.0.3", &[(22, PortState::Open)]),
                renamed,
            ],
        };

        let topology = translate(&result);
        assert_eq!(topology.nodes.len(), 2);
        assert!(topology.edges.is_empty());
        assert_eq!(topology.nodes[0].name, "second");
        assert_eq!(topology.finding_count(), 1);
    }

    #[test]
    fn test_lone_telnet_host() {
        let result: ScanResult = serde_json::from_value(serde_json::json!({
            "scan_info": {},
            "hosts": [{ "ip": "10.0.0.5", "ports": [{ "port": 23, "state": "open" }] }]
        }))
        .unwrap();

        let topology = translate(&result);
        assert_eq!(topology.nodes.len(), 1);
        let node = &topology.nodes[0];
        assert_eq!(node.node_type, NodeType::Host);

        let findings = node.vulnerabilities.as_deref().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].cve.as_deref(), Some("CVE-1999-0619"));
    }

    #[test]
    fn test_translate_is_deterministic() {
        let result = ScanResult {
            scan_info: serde_json::Value::Null,
            hosts: vec![host("192.168.1.10", &[(21, PortState::Open)])],
        };
        assert_eq!(translate(&result), translate(&result));
    }
}
