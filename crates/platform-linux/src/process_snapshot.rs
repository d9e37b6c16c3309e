//! Process table snapshot from `/proc`
//!
//! Provides a point-in-time listing of every process with its PID, PPID and
//! short command name. Processes that exit while the listing is taken are
//! skipped.

use crate::error::proc_error;
use procfs::process::{all_processes, Process};
use tracing::debug;
use witr_core::{ProbeResult, ProcessEntry};

/// Snapshot every visible process
pub fn list_processes() -> ProbeResult<Vec<ProcessEntry>> {
    let iter = all_processes().map_err(|e| proc_error(0, "process list", e))?;

    let mut entries = Vec::new();
    for proc in iter {
        let proc = match proc {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "skipping process that vanished during listing");
                continue;
            }
        };
        match entry_for(&proc) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!(pid = proc.pid(), error = %e, "skipping unreadable process"),
        }
    }

    entries.sort_by_key(|e| e.pid);
    Ok(entries)
}

fn entry_for(proc: &Process) -> ProbeResult<ProcessEntry> {
    let pid = proc.pid() as u32;
    let stat = proc.stat().map_err(|e| proc_error(pid, "stat", e))?;
    Ok(ProcessEntry {
        pid,
        parent_pid: stat.ppid.max(0) as u32,
        command_name: stat.comm,
    })
}
