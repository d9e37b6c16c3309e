//! Network port to PID resolution
//!
//! The kernel's TCP tables (`/proc/net/tcp`, `/proc/net/tcp6`) give socket
//! inodes but no owners; owners come from matching those inodes against each
//! process's descriptor table. When that fails (other users' processes are
//! invisible without privileges) `ss` and `lsof` are tried in turn.

use crate::command::run_bounded;
use crate::error::{proc_error, table_error};
use crate::ProbeConfig;
use procfs::net::{tcp, tcp6, TcpNetEntry, TcpState};
use procfs::process::{all_processes, FDTarget, Process};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use witr_core::{ListeningSocket, PortStrategy, ProbeResult, SocketState};

/// Kernel name for a TCP state, as `ss` and `netstat` print it
pub fn state_label(state: &TcpState) -> &'static str {
    match state {
        TcpState::Established => "ESTABLISHED",
        TcpState::SynSent => "SYN_SENT",
        TcpState::SynRecv => "SYN_RECV",
        TcpState::FinWait1 => "FIN_WAIT1",
        TcpState::FinWait2 => "FIN_WAIT2",
        TcpState::TimeWait => "TIME_WAIT",
        TcpState::Close => "CLOSE",
        TcpState::CloseWait => "CLOSE_WAIT",
        TcpState::LastAck => "LAST_ACK",
        TcpState::Listen => "LISTEN",
        TcpState::Closing => "CLOSING",
        TcpState::NewSynRecv => "NEW_SYN_RECV",
    }
}

/// States worth surfacing ahead of a plain listener
fn is_lingering(state: &TcpState) -> bool {
    matches!(
        state,
        TcpState::TimeWait | TcpState::CloseWait | TcpState::FinWait1 | TcpState::FinWait2
    )
}

/// Both kernel TCP tables; an unreadable tcp6 table (IPv6 disabled) is not an error
pub fn read_tcp_tables() -> ProbeResult<Vec<TcpNetEntry>> {
    let mut entries = tcp().map_err(|e| table_error("/proc/net/tcp", e))?;
    match tcp6() {
        Ok(v6) => entries.extend(v6),
        Err(e) => debug!(error = %e, "no IPv6 TCP table"),
    }
    Ok(entries)
}

/// Socket inodes held open by one process
pub fn socket_inodes(proc: &Process) -> ProbeResult<HashSet<u64>> {
    let pid = proc.pid() as u32;
    let fds = proc.fd().map_err(|e| proc_error(pid, "fd", e))?;
    Ok(fds
        .filter_map(Result::ok)
        .filter_map(|fd| match fd.target {
            FDTarget::Socket(inode) => Some(inode),
            _ => None,
        })
        .collect())
}

/// Lowest owning PID for each of the wanted socket inodes
///
/// Processes whose descriptors are unreadable are skipped; their sockets
/// stay unattributed.
fn owners_of(inodes: &HashSet<u64>) -> ProbeResult<HashMap<u64, u32>> {
    let mut owners: HashMap<u64, u32> = HashMap::new();
    if inodes.is_empty() {
        return Ok(owners);
    }

    for proc in all_processes()
        .map_err(|e| proc_error(0, "process list", e))?
        .filter_map(Result::ok)
    {
        let pid = proc.pid() as u32;
        let held = match socket_inodes(&proc) {
            Ok(held) => held,
            Err(_) => continue,
        };
        for inode in held.intersection(inodes) {
            owners
                .entry(*inode)
                .and_modify(|owner| *owner = (*owner).min(pid))
                .or_insert(pid);
        }
    }
    Ok(owners)
}

/// Every TCP listener on the system, with owners where visible
pub fn listening_sockets() -> ProbeResult<Vec<ListeningSocket>> {
    let listeners: Vec<TcpNetEntry> = read_tcp_tables()?
        .into_iter()
        .filter(|e| e.state == TcpState::Listen)
        .collect();

    let wanted: HashSet<u64> = listeners.iter().map(|e| e.inode).filter(|i| *i != 0).collect();
    let owners = owners_of(&wanted)?;

    Ok(listeners
        .into_iter()
        .map(|e| ListeningSocket {
            port: e.local_address.port(),
            address: e.local_address.ip().to_string(),
            pid: owners.get(&e.inode).copied(),
        })
        .collect())
}

/// Ports and addresses `proc` listens on
pub fn listeners_for(proc: &Process, table: &[TcpNetEntry]) -> Vec<(u16, String)> {
    let Ok(held) = socket_inodes(proc) else {
        return Vec::new();
    };
    table
        .iter()
        .filter(|e| e.state == TcpState::Listen && held.contains(&e.inode))
        .map(|e| (e.local_address.port(), e.local_address.ip().to_string()))
        .collect()
}

/// Most telling TCP state on a local port
///
/// Lingering close states explain "address already in use" and win over a
/// listener; a listener wins over everything else.
pub(crate) fn pick_socket_state(port: u16, entries: &[TcpNetEntry]) -> Option<SocketState> {
    let on_port: Vec<&TcpNetEntry> = entries
        .iter()
        .filter(|e| e.local_address.port() == port)
        .collect();
    let chosen = on_port
        .iter()
        .find(|e| is_lingering(&e.state))
        .or_else(|| on_port.iter().find(|e| e.state == TcpState::Listen))
        .or_else(|| on_port.first())?;

    Some(SocketState::new(
        port,
        state_label(&chosen.state),
        chosen.local_address.to_string(),
        chosen.remote_address.to_string(),
    ))
}

/// `ss -H -ltnp`
pub struct SsStrategy<'a> {
    config: &'a ProbeConfig,
}

impl<'a> SsStrategy<'a> {
    pub fn new(config: &'a ProbeConfig) -> Self {
        Self { config }
    }
}

impl PortStrategy for SsStrategy<'_> {
    fn name(&self) -> &'static str {
        "ss"
    }

    fn lookup(&self, port: u16) -> ProbeResult<Vec<ListeningSocket>> {
        let output = run_bounded("ss", &["-H", "-ltnp"], self.config)?;
        Ok(parse_ss(&output)
            .into_iter()
            .filter(|s| s.port == port)
            .collect())
    }
}

/// Parse `ss -H -ltnp` rows
///
/// ```text
/// LISTEN 0 511 0.0.0.0:80 0.0.0.0:* users:(("nginx",pid=700,fd=6),("nginx",pid=701,fd=6))
/// ```
/// A row without a `users:` column (owner hidden) yields one ownerless entry.
pub fn parse_ss(output: &str) -> Vec<ListeningSocket> {
    let mut sockets = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || fields[0] != "LISTEN" {
            continue;
        }
        let Some((address, port)) = split_host_port(fields[3]) else {
            continue;
        };

        let process = fields[5..].join(" ");
        let pids = process_pids(&process);
        if pids.is_empty() {
            sockets.push(ListeningSocket {
                port,
                address,
                pid: None,
            });
        } else {
            sockets.extend(pids.into_iter().map(|pid| ListeningSocket {
                port,
                address: address.clone(),
                pid: Some(pid),
            }));
        }
    }
    sockets
}

/// Every `pid=N` in an `ss` process column
fn process_pids(column: &str) -> Vec<u32> {
    column
        .split("pid=")
        .skip(1)
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect()
}

/// `lsof -nP -iTCP -sTCP:LISTEN -F pn`
pub struct LsofStrategy<'a> {
    config: &'a ProbeConfig,
}

impl<'a> LsofStrategy<'a> {
    pub fn new(config: &'a ProbeConfig) -> Self {
        Self { config }
    }
}

impl PortStrategy for LsofStrategy<'_> {
    fn name(&self) -> &'static str {
        "lsof"
    }

    fn lookup(&self, port: u16) -> ProbeResult<Vec<ListeningSocket>> {
        let output = run_bounded(
            "lsof",
            &["-nP", "-iTCP", "-sTCP:LISTEN", "-F", "pn"],
            self.config,
        )?;
        Ok(parse_lsof(&output)
            .into_iter()
            .filter(|s| s.port == port)
            .collect())
    }
}

/// Parse `lsof -F pn` field output
///
/// `p` lines start a process set; each following `n` line names one of its
/// sockets (`*:80`, `[::1]:5432`, `127.0.0.1:631`).
pub fn parse_lsof(output: &str) -> Vec<ListeningSocket> {
    let mut sockets = Vec::new();
    let mut current_pid = None;
    for line in output.lines() {
        let mut chars = line.chars();
        let tag = chars.next();
        let value = chars.as_str();
        match tag {
            Some('p') => current_pid = value.parse().ok(),
            Some('n') => {
                let Some((address, port)) = split_host_port(value) else {
                    continue;
                };
                sockets.push(ListeningSocket {
                    port,
                    address,
                    pid: current_pid,
                });
            }
            _ => {}
        }
    }
    sockets
}

/// Split `host:port`, tolerating `[v6]:port`, `*:port` and `addr%iface:port`
fn split_host_port(s: &str) -> Option<(String, u16)> {
    // connection names look like local->remote; only the local side matters
    let local = s.split("->").next()?;
    let (host, port) = local.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = host.split('%').next().unwrap_or(host);
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use procfs::net::TcpNetEntries;
    use procfs::{ExplicitSystemInfo, FromBufReadSI};
    use rstest::rstest;

    const TCP4: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 31337 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 4242 1 0000000000000000 100 0 0 10 0
   2: 0100007F:1F90 0100007F:D431 06 00000000:00000000 03:00000F2B 00000000     0        0 0 3 0000000000000000
";

    const TCP6: &str = "\
  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000000000000:0050 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 31338 1 0000000000000000 100 0 0 10 0
   1: 00000000000000000000000001000000:1538 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000   106        0 5151 1 0000000000000000 100 0 0 10 0
";

    /// Fixtures are little-endian dumps, whatever the host
    fn table(contents: &str) -> Vec<TcpNetEntry> {
        let info = ExplicitSystemInfo {
            boot_time_secs: 0,
            ticks_per_second: 100,
            page_size: 4096,
            is_little_endian: true,
        };
        TcpNetEntries::from_buf_read(contents.as_bytes(), &info)
            .expect("Should parse fixture")
            .0
    }

    #[test]
    fn test_tcp4_fixture_rows() {
        let rows = table(TCP4);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].local_address, "0.0.0.0:80".parse().unwrap());
        assert_eq!(rows[0].state, TcpState::Listen);
        assert_eq!(rows[0].inode, 31337);
        assert_eq!(rows[1].local_address, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(state_label(&rows[2].state), "TIME_WAIT");
        assert_eq!(rows[2].remote_address, "127.0.0.1:54321".parse().unwrap());
    }

    #[test]
    fn test_tcp6_fixture_rows() {
        let rows = table(TCP6);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].local_address, "[::]:80".parse().unwrap());
        assert_eq!(rows[1].local_address, "[::1]:5432".parse().unwrap());
    }

    #[rstest]
    #[case(TcpState::TimeWait, true)]
    #[case(TcpState::CloseWait, true)]
    #[case(TcpState::FinWait2, true)]
    #[case(TcpState::Listen, false)]
    #[case(TcpState::Established, false)]
    fn test_lingering_states(#[case] state: TcpState, #[case] lingering: bool) {
        assert_eq!(is_lingering(&state), lingering);
    }

    #[test]
    fn test_lingering_state_preferred() {
        let rows = table(TCP4);
        let state = pick_socket_state(8080, &rows).unwrap();
        assert_eq!(state.state, "TIME_WAIT");
        assert!(state.is_problematic());
        assert_eq!(state.local_addr, "127.0.0.1:8080");

        let state = pick_socket_state(80, &rows).unwrap();
        assert_eq!(state.state, "LISTEN");
        assert!(pick_socket_state(81, &rows).is_none());
    }

    #[test]
    fn test_parse_ss() {
        let output = "\
LISTEN 0      511          0.0.0.0:80        0.0.0.0:*    users:((\"nginx\",pid=700,fd=6),(\"nginx\",pid=701,fd=6))
LISTEN 0      4096   127.0.0.53%lo:53        0.0.0.0:*
LISTEN 0      128             [::]:22           [::]:*    users:((\"sshd\",pid=812,fd=4))
";
        let sockets = parse_ss(output);
        assert_eq!(sockets.len(), 4);
        assert_eq!(sockets[0].pid, Some(700));
        assert_eq!(sockets[1].pid, Some(701));
        assert_eq!(sockets[2].address, "127.0.0.53");
        assert_eq!(sockets[2].port, 53);
        assert_eq!(sockets[2].pid, None);
        assert_eq!(sockets[3].address, "::");
        assert_eq!(sockets[3].port, 22);
    }

    #[test]
    fn test_parse_lsof() {
        let output = "p700\nf6\nn*:80\nf7\nn[::]:80\np812\nf4\nn127.0.0.1:22\n";
        let sockets = parse_lsof(output);
        assert_eq!(sockets.len(), 3);
        assert_eq!(sockets[0].pid, Some(700));
        assert_eq!(sockets[0].address, "*");
        assert_eq!(sockets[1].address, "::");
        assert_eq!(sockets[2].pid, Some(812));
        assert_eq!(sockets[2].port, 22);
    }

    #[rstest]
    #[case("0.0.0.0:80", Some(("0.0.0.0", 80)))]
    #[case("[::1]:5432", Some(("::1", 5432)))]
    #[case("*:8080", Some(("*", 8080)))]
    #[case("fe80::1%eth0:22", Some(("fe80::1", 22)))]
    #[case("10.0.0.1:443->10.0.0.2:50000", Some(("10.0.0.1", 443)))]
    #[case("no-port", None)]
    fn test_split_host_port(#[case] input: &str, #[case] expected: Option<(&str, u16)>) {
        let got = split_host_port(input);
        assert_eq!(
            got.as_ref().map(|(h, p)| (h.as_str(), *p)),
            expected
        );
    }

    #[test]
    fn test_live_tables_readable() {
        assert!(read_tcp_tables().is_ok());
    }

    #[test]
    #[ignore] // reads the live process table
    fn test_listening_sockets_live() {
        let sockets = listening_sockets().expect("Should read TCP tables");
        println!("{} listeners", sockets.len());
    }
}
