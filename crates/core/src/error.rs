//! Error types for resolution, ancestry and platform probing

use crate::models::{Candidate, Query, TargetKind};
use thiserror::Error;

/// Errors reported by a [`PlatformProbe`](crate::probe::PlatformProbe)
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Process not found (never existed or already exited)
    #[error("Process {pid} not found")]
    ProcessNotFound { pid: u32 },

    /// Access denied to process
    #[error("Access denied to process {pid}")]
    AccessDenied { pid: u32 },

    /// Service unit exists but has no main process
    #[error("Service {unit} is not running")]
    NotRunning { unit: String },

    /// External probe exited unsuccessfully or could not be spawned
    #[error("{program} failed: {message}")]
    CommandFailed {
        program: &'static str,
        message: String,
    },

    /// External probe did not finish in time
    #[error("{program} timed out after {seconds:.1}s")]
    Timeout { program: &'static str, seconds: f64 },

    /// Reading a kernel interface failed
    #[error("Failed to read {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Kernel or tool output did not have the expected shape
    #[error("Unexpected format: {0}")]
    Parse(String),
}

impl ProbeError {
    /// Map an I/O error on a per-process file to the matching variant
    pub fn from_io(pid: u32, context: impl Into<String>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => ProbeError::ProcessNotFound { pid },
            std::io::ErrorKind::PermissionDenied => ProbeError::AccessDenied { pid },
            _ => ProbeError::Io {
                context: context.into(),
                source,
            },
        }
    }

    /// Check if this is an access denied error
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ProbeError::AccessDenied { .. })
    }

    /// Check if the process is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProbeError::ProcessNotFound { .. })
    }
}

/// Result type for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that end a query
#[derive(Debug, Error)]
pub enum WitrError {
    /// Malformed PID/port/path value
    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidInput {
        kind: TargetKind,
        value: String,
        reason: String,
    },

    /// Nothing matched the query
    #[error("no running process matches {query}")]
    NotFound { query: Query },

    /// More than one process matched; the caller must pick
    #[error("{} processes match {query}", .candidates.len())]
    AmbiguousMatch {
        query: Query,
        candidates: Vec<Candidate>,
    },

    /// A listener exists but its owner is hidden (usually needs root)
    #[error("socket found on port {port} but owning process not detected")]
    SocketFoundNoOwner { port: u16 },

    /// Not even the target's own record was readable
    #[error("no process ancestry found for PID {pid}")]
    NoAncestryFound {
        pid: u32,
        #[source]
        cause: Option<ProbeError>,
    },

    /// Underlying platform failure
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

impl WitrError {
    pub(crate) fn invalid(kind: TargetKind, value: &str, reason: impl Into<String>) -> Self {
        WitrError::InvalidInput {
            kind,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// True when re-running with more privileges may help
    pub fn needs_privileges(&self) -> bool {
        match self {
            WitrError::SocketFoundNoOwner { .. } => true,
            WitrError::NoAncestryFound { cause, .. } => {
                cause.as_ref().is_some_and(ProbeError::is_access_denied)
            }
            WitrError::Probe(e) => e.is_access_denied(),
            _ => false,
        }
    }
}

/// Result type for query-level operations
pub type WitrResult<T> = Result<T, WitrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_kinds() {
        let not_found = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(ProbeError::from_io(7, "stat", not_found).is_not_found());

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(ProbeError::from_io(7, "environ", denied).is_access_denied());

        let other = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert!(matches!(
            ProbeError::from_io(7, "cmdline", other),
            ProbeError::Io { .. }
        ));
    }

    #[test]
    fn test_error_messages_echo_query() {
        let err = WitrError::NotFound {
            query: Query::name("nginx"),
        };
        assert_eq!(err.to_string(), "no running process matches \"nginx\"");

        let err = WitrError::SocketFoundNoOwner { port: 443 };
        assert!(err.needs_privileges());
        assert!(err.to_string().contains("443"));
    }
}
