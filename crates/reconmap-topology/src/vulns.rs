//! Heuristic vulnerability flags for open ports.
//!
//! These are exposure hints, not scanner findings: each rule looks at one
//! open port in isolation. Rules are evaluated in table order and every
//! match contributes a finding.

use reconmap_core::{HostRecord, PortRecord, Severity, VulnerabilityFinding};

/// One entry of the rule table.
#[derive(Clone, Copy)]
pub struct VulnRule {
    pub name: &'static str,
    check: fn(&PortRecord) -> Option<VulnerabilityFinding>,
}

impl VulnRule {
    pub fn evaluate(&self, port: &PortRecord) -> Option<VulnerabilityFinding> {
        (self.check)(port)
    }
}

impl std::fmt::Debug for VulnRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulnRule").field("name", &self.name).finish()
    }
}

pub const RULES: &[VulnRule] = &[
    VulnRule {
        name: "ssh-exposed",
        check: ssh_exposed,
    },
    VulnRule {
        name: "telnet-exposed",
        check: telnet_exposed,
    },
    VulnRule {
        name: "ftp-exposed",
        check: ftp_exposed,
    },
    VulnRule {
        name: "outdated-web-server",
        check: outdated_web_server,
    },
];

/// Run every rule against every open port of `host`.
pub fn detect_vulnerabilities(host: &HostRecord) -> Vec<VulnerabilityFinding> {
    host.ports
        .iter()
        .filter(|port| port.is_open())
        .flat_map(|port| RULES.iter().filter_map(move |rule| rule.evaluate(port)))
        .collect()
}

fn finding(severity: Severity, description: String, cve: Option<&str>) -> VulnerabilityFinding {
    VulnerabilityFinding {
        severity,
        description,
        cve: cve.map(String::from),
    }
}

fn ssh_exposed(port: &PortRecord) -> Option<VulnerabilityFinding> {
    (port.port == 22).then(|| {
        finding(
            Severity::Medium,
            "SSH service exposed on port 22".to_string(),
            None,
        )
    })
}

fn telnet_exposed(port: &PortRecord) -> Option<VulnerabilityFinding> {
    (port.port == 23).then(|| {
        finding(
            Severity::High,
            "Telnet service exposed on port 23; credentials travel in cleartext".to_string(),
            Some("CVE-1999-0619"),
        )
    })
}

fn ftp_exposed(port: &PortRecord) -> Option<VulnerabilityFinding> {
    (port.port == 21).then(|| {
        finding(
            Severity::Medium,
            "FTP service exposed on port 21".to_string(),
            None,
        )
    })
}

fn outdated_web_server(port: &PortRecord) -> Option<VulnerabilityFinding> {
    let product = port.product.as_deref()?;
    if !(product.contains("Apache") || product.contains("nginx")) {
        return None;
    }

    let version = port.version.as_deref()?;
    let major: u32 = version
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())?
        .parse()
        .ok()?;

    (major <= 2).then(|| {
        finding(
            Severity::High,
            format!("Outdated web server {product} {version} on port {}", port.port),
            None,
        )
    })
}

#[cfg(test)]
mod tests {
    use reconmap_core::{PortState, Protocol};

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

    fn web(product: &str, version: Option<&str>) -> PortRecord {
        PortRecord {
            product: Some(product.to_string()),
            version: version.map(String::from),
            ..port(80, PortState::Open)
        }
    }

    fn host(ports: Vec<PortRecord>) -> HostRecord {
        HostRecord {
            ip: "10.0.0.5".to_string(),
            ports,
            ..Default::default()
        }
    }

    #[test]
    fn test_remote_access_ports() {
        let findings = detect_vulnerabilities(&host(vec![
            port(22, PortState::Open),
            port(23, PortState::Open),
            port(21, PortState::Open),
        ]));

        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].cve, None);
        assert_eq!(findings[1].severity, Severity::High);
        assert_eq!(findings[1].cve.as_deref(), Some("CVE-1999-0619"));
        assert_eq!(findings[2].severity, Severity::Medium);
    }

    #[test]
    fn test_closed_ports_ignored() {
        let findings = detect_vulnerabilities(&host(vec![
            port(22, PortState::Closed),
            port(23, PortState::Filtered),
        ]));
        assert!(findings.is_empty());
    }

    #[test]
    fn test_outdated_web_server_versions() {
        assert!(outdated_web_server(&web("Apache httpd", Some("2.4.41"))).is_some());
        assert!(outdated_web_server(&web("nginx", Some("1.18.0"))).is_some());
        assert!(outdated_web_server(&web("nginx", Some("0.7"))).is_some());
        assert!(outdated_web_server(&web("nginx", Some("3.0"))).is_none());
        assert!(outdated_web_server(&web("nginx", None)).is_none());
        assert!(outdated_web_server(&web("lighttpd", Some("1.4"))).is_none());

        let f = outdated_web_server(&web("Apache httpd", Some("2.4.41"))).unwrap();
        assert_eq!(f.severity, Severity::High);
        assert!(f.description.contains("Apache httpd"));
        assert!(f.description.contains("2.4.41"));
        assert_eq!(f.cve, None);
    }

    #[test]
    fn test_rule_order_is_stable() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            ["ssh-exposed", "telnet-exposed", "ftp-exposed", "outdated-web-server"]
        );
    }
}
