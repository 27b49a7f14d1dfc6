use thiserror::Error;

/// Local request problems caught before anything is sent over the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Scan target is required")]
    MissingTarget,

    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    #[error("Custom scans require ports or arguments")]
    CustomOptionsMissing,

    #[error("Invalid port spec {spec:?}: {reason}")]
    InvalidPorts { spec: String, reason: String },

    #[error("A scan is already {phase}; reset or discard it before starting another")]
    ScanInProgress { phase: String },
}

/// Top-level error type for reconmap.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error after {attempts} attempt(s): {message}")]
    Transport { message: String, attempts: u32 },

    #[error("Application error ({status}): {message}")]
    Application { status: u16, message: String },

    #[error("Scan job failed: {message}")]
    JobFailure {
        message: String,
        hint: Option<String>,
    },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Scan {scan_id} did not finish within {max_secs}s")]
    PollTimeout { scan_id: String, max_secs: u64 },

    #[error("Cannot {action} while {phase}")]
    InvalidTransition { action: String, phase: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, ReconError>;

impl ReconError {
    /// Build a `JobFailure` from a backend-reported error string, attaching a
    /// friendlier hint when the message matches a known failure pattern.
    pub fn job_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = failure_hint(&message).map(String::from);
        Self::JobFailure { message, hint }
    }

    /// Transport errors are the only class the retrying transport masks.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The friendly remapping for job failures, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::JobFailure { hint, .. } => hint.as_deref(),
            Self::Transport { .. } => Some("The scan server could not be reached. Check that it is running and reachable."),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ReconError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<std::io::Error> for ReconError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Map raw backend failure text onto user-facing guidance.
pub fn failure_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();

    if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
        return Some("The server's TLS certificate was rejected. Verify the certificate or scan over plain HTTP.");
    }
    if lower.contains("permission")
        || lower.contains("privileges")
        || lower.contains("operation not permitted")
        || lower.contains("requires root")
    {
        return Some("The scanner lacks the privileges this scan needs. Run the backend with elevated permissions or pick a TCP connect scan.");
    }
    if (lower.contains("nmap") && (lower.contains("not found") || lower.contains("not installed")))
        || lower.contains("no such file")
        || lower.contains("was not found in path")
    {
        return Some("The nmap binary is missing on the scan server. Install nmap and make sure it is on PATH.");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failure_hints() {
        let err = ReconError::job_failure("nmap program was not found in path");
        assert!(err.hint().unwrap().contains("nmap binary"));

        let err = ReconError::job_failure("You requested a scan type which requires root privileges.");
        assert!(err.hint().unwrap().contains("privileges"));

        let err = ReconError::job_failure("SSL: CERTIFICATE_VERIFY_FAILED");
        assert!(err.hint().unwrap().contains("certificate"));

        let err = ReconError::job_failure("host timed out");
        assert_eq!(err.hint(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ReconError::Application {
            status: 400,
            message: "invalid target".to_string(),
        };
        assert_eq!(err.to_string(), "Application error (400): invalid target");

        let err: ReconError = ValidationError::CustomOptionsMissing.into();
        assert!(err.to_string().contains("ports or arguments"));
        assert!(!err.is_transport());
    }
}
