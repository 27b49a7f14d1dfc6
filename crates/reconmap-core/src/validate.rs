//! Local validation of scan targets and port specs.
//!
//! Everything here runs before a request leaves the process; failures are
//! reported as [`ValidationError`] and never retried.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::ValidationError;

/// Check that `target` is an IP address, a CIDR block, or a hostname.
///
/// Hostnames may carry a `:port` suffix, matching what the scan backend accepts.
pub fn validate_target(target: &str) -> Result<(), ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::MissingTarget);
    }

    if target.parse::<IpAddr>().is_ok() || target.parse::<IpNet>().is_ok() {
        return Ok(());
    }

    // Dotted quads that failed to parse above are malformed addresses, not hostnames.
    if target
        .split(['.', '/'])
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(ValidationError::InvalidTarget(target.to_string()));
    }

    if is_hostname(target) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTarget(target.to_string()))
    }
}

fn is_hostname(target: &str) -> bool {
    let (host, port) = match target.rsplit_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (target, None),
    };

    if let Some(port) = port {
        if port.is_empty() || port.len() > 5 || !port.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }

    if host.len() < 2 || host.len() > 255 {
        return false;
    }

    let bytes = host.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_alphanumeric();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }

    host.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}

/// Parse a port spec such as `22,80,8000-8080` into inclusive ranges.
///
/// Whitespace around entries is ignored; empty entries are rejected.
pub fn parse_port_spec(spec: &str) -> Result<Vec<(u16, u16)>, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidPorts {
        spec: spec.to_string(),
        reason,
    };

    let mut ranges = Vec::new();
    for entry in spec.split(',').map(str::trim) {
        if entry.is_empty() {
            return Err(invalid("empty entry".to_string()));
        }

        if let Some((a, b)) = entry.split_once('-') {
            let start = parse_port(a.trim()).map_err(&invalid)?;
            let end = parse_port(b.trim()).map_err(&invalid)?;
            if start > end {
                return Err(invalid(format!("range {start}-{end} has start > end")));
            }
            ranges.push((start, end));
        } else {
            let port = parse_port(entry).map_err(&invalid)?;
            ranges.push((port, port));
        }
    }

    Ok(ranges)
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.parse::<u16>()
        .map_err(|_| format!("{s:?} is not a port number in 0-65535"))
}
