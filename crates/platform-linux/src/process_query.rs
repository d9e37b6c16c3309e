//! Per-process detail queries
//!
//! Everything beyond the snapshot row: command line, executable, owner,
//! start time, environment, working directory, listeners and run state.
//! Only the `stat` read is mandatory; other fields are left empty when the
//! kernel refuses them (other users' processes without privileges).

use crate::error::proc_error;
use crate::net::listeners_for;
use nix::unistd::{Uid, User};
use procfs::net::TcpNetEntry;
use procfs::process::Process;
use std::sync::OnceLock;
use time::OffsetDateTime;
use tracing::debug;
use witr_core::{ProbeError, ProbeResult, ProcessHealth, ProcessRecord};

/// Full record for `pid`; `tcp_table` supplies listener rows to match against
pub fn read_record(pid: u32, tcp_table: &[TcpNetEntry]) -> ProbeResult<ProcessRecord> {
    let proc = open(pid)?;
    let stat = proc.stat().map_err(|e| proc_error(pid, "stat", e))?;

    let mut record = ProcessRecord::new(pid, stat.ppid.max(0) as u32, stat.comm.clone());
    record.health = ProcessHealth::from_state_char(stat.state);
    record.start_time = start_time(stat.starttime);
    record.cmdline = command_line_of(&proc).unwrap_or_default();
    record.exe_path = proc.exe().ok().map(|p| p.to_string_lossy().into_owned());
    record.working_dir = proc.cwd().ok().map(|p| p.to_string_lossy().into_owned());
    record.user = proc.uid().ok().map(user_name);
    record.environment = environment(pid).unwrap_or_default();

    for (port, address) in listeners_for(&proc, tcp_table) {
        record.listening_ports.insert(port);
        record.bind_addresses.insert(address);
    }

    Ok(record)
}

/// Command line with arguments joined by spaces
pub fn get_command_line(pid: u32) -> ProbeResult<String> {
    command_line_of(&open(pid)?)
}

fn command_line_of(proc: &Process) -> ProbeResult<String> {
    let pid = proc.pid() as u32;
    let args = proc.cmdline().map_err(|e| proc_error(pid, "cmdline", e))?;
    Ok(args.join(" "))
}

/// Environment in `KEY=value` form, in the order the process holds it
///
/// Read raw so ordering survives; procfs hands back a map.
pub fn environment(pid: u32) -> ProbeResult<Vec<String>> {
    let raw = std::fs::read(format!("/proc/{pid}/environ"))
        .map_err(|e| ProbeError::from_io(pid, format!("environ of PID {pid}"), e))?;
    Ok(raw
        .split(|b| *b == 0)
        .filter(|var| !var.is_empty())
        .map(|var| String::from_utf8_lossy(var).into_owned())
        .collect())
}

/// Raw `/proc/<pid>/cgroup` contents
pub fn read_cgroup(pid: u32) -> ProbeResult<String> {
    std::fs::read_to_string(format!("/proc/{pid}/cgroup"))
        .map_err(|e| ProbeError::from_io(pid, format!("cgroup of PID {pid}"), e))
}

fn open(pid: u32) -> ProbeResult<Process> {
    let pid_i32 = i32::try_from(pid).map_err(|_| ProbeError::ProcessNotFound { pid })?;
    Process::new(pid_i32).map_err(|e| proc_error(pid, "process", e))
}

/// Passwd name for a uid, or the number itself
fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        Ok(None) => uid.to_string(),
        Err(e) => {
            debug!(uid, error = %e, "passwd lookup failed");
            uid.to_string()
        }
    }
}

/// Wall-clock start from `starttime` (clock ticks after boot)
fn start_time(ticks: u64) -> Option<OffsetDateTime> {
    let boot = boot_time()?;
    let secs = ticks as f64 / procfs::ticks_per_second() as f64;
    let unix = boot as i128 * 1_000_000_000 + (secs * 1e9) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(unix).ok()
}

fn boot_time() -> Option<u64> {
    static BOOT: OnceLock<Option<u64>> = OnceLock::new();
    *BOOT.get_or_init(|| match procfs::boot_time_secs() {
        Ok(secs) => Some(secs),
        Err(e) => {
            debug!(error = %e, "boot time unavailable");
            None
        }
    })
}
