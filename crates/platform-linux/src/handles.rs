//! File descriptor enumeration for processes
//!
//! Walks `/proc/<pid>/fd` and `/proc/<pid>/maps` to find who holds a file,
//! and summarises one process's descriptor usage.

use crate::error::proc_error;
use procfs::process::{all_processes, FDTarget, LimitValue, MMapPath, Process};
use std::path::{Path, PathBuf};
use tracing::debug;
use witr_core::{FileContext, ProbeResult};

/// PIDs with `path` open as a descriptor or memory mapping, in `/proc` order
///
/// Processes whose tables are unreadable are skipped.
pub fn open_file_holders(path: &Path) -> ProbeResult<Vec<u32>> {
    let mut holders = Vec::new();
    for proc in all_processes()
        .map_err(|e| proc_error(0, "process list", e))?
        .filter_map(Result::ok)
    {
        let pid = proc.pid() as u32;
        if holds_descriptor(&proc, path) || holds_mapping(&proc, path) {
            holders.push(pid);
        }
    }
    Ok(holders)
}

fn holds_descriptor(proc: &Process, path: &Path) -> bool {
    match proc.fd() {
        Ok(fds) => fds
            .filter_map(Result::ok)
            .any(|fd| matches!(&fd.target, FDTarget::Path(p) if p == path)),
        Err(e) => {
            debug!(pid = proc.pid(), error = %e, "fd table unreadable");
            false
        }
    }
}

fn holds_mapping(proc: &Process, path: &Path) -> bool {
    match proc.maps() {
        Ok(maps) => maps
            .iter()
            .any(|m| matches!(&m.pathname, MMapPath::Path(p) if p == path)),
        Err(_) => false,
    }
}

/// Paths of all regular-file descriptors held by `proc`
pub fn open_paths(proc: &Process) -> ProbeResult<Vec<PathBuf>> {
    let pid = proc.pid() as u32;
    let fds = proc.fd().map_err(|e| proc_error(pid, "fd", e))?;
    Ok(fds
        .filter_map(Result::ok)
        .filter_map(|fd| match fd.target {
            FDTarget::Path(p) => Some(p),
            _ => None,
        })
        .collect())
}

/// Descriptor count, soft limit and lock-like files for `pid`
pub fn file_context(pid: u32) -> ProbeResult<FileContext> {
    let proc = Process::new(pid as i32).map_err(|e| proc_error(pid, "process", e))?;
    let open_files = proc.fd_count().map_err(|e| proc_error(pid, "fd", e))?;
    let file_limit = match proc.limits() {
        Ok(limits) => match limits.max_open_files.soft_limit {
            LimitValue::Value(v) => v,
            LimitValue::Unlimited => 0,
        },
        Err(e) => {
            debug!(pid, error = %e, "limits unreadable");
            0
        }
    };

    let mut locked_files: Vec<String> = open_paths(&proc)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| is_lock_like(p))
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    locked_files.sort();
    locked_files.dedup();

    Ok(FileContext {
        open_files,
        file_limit,
        locked_files,
    })
}

/// `*.lock`, `*.pid`, or a path component starting with `lock`
fn is_lock_like(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str());
    matches!(ext, Some("lock") | Some("pid"))
        || path.to_str().is_some_and(|s| s.contains("/lock"))
}
