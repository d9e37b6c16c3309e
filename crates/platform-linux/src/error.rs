//! Mapping of procfs failures onto probe errors

use procfs::ProcError;
use witr_core::ProbeError;

/// Translate a procfs error for `pid`
///
/// A missing `/proc/<pid>` entry means the process is gone; `Incomplete`
/// shows up for zombies whose files are already torn down and is treated the
/// same way.
pub fn proc_error(pid: u32, context: &str, err: ProcError) -> ProbeError {
    match err {
        ProcError::NotFound(_) | ProcError::Incomplete(_) => ProbeError::ProcessNotFound { pid },
        ProcError::PermissionDenied(_) => ProbeError::AccessDenied { pid },
        ProcError::Io(source, _) => ProbeError::from_io(pid, format!("{context} of PID {pid}"), source),
        other => ProbeError::Parse(format!("{context} of PID {pid}: {other}")),
    }
}

/// Translate a procfs error for a system-wide table such as `/proc/net/tcp`
pub fn table_error(path: &str, err: ProcError) -> ProbeError {
    let source = match err {
        ProcError::Io(source, _) => source,
        ProcError::NotFound(_) => std::io::ErrorKind::NotFound.into(),
        ProcError::PermissionDenied(_) => std::io::ErrorKind::PermissionDenied.into(),
        other => return ProbeError::Parse(format!("{path}: {other}")),
    };
    ProbeError::Io {
        context: path.to_string(),
        source,
    }
}
