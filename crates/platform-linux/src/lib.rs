//! witr-platform-linux: Linux collectors for witr
//!
//! Reads `/proc` for process, socket and descriptor state, and falls back to
//! `ss`, `lsof` and `systemctl` where `/proc` alone cannot answer. Everything
//! is exposed to the core through [`LinuxProbe`].

#[cfg(target_os = "linux")]
pub mod command;
#[cfg(target_os = "linux")]
pub mod error;
#[cfg(target_os = "linux")]
pub mod handles;
#[cfg(target_os = "linux")]
pub mod net;
#[cfg(target_os = "linux")]
pub mod process_query;
#[cfg(target_os = "linux")]
pub mod process_snapshot;
#[cfg(target_os = "linux")]
pub mod services;

#[cfg(target_os = "linux")]
pub use handles::{file_context, open_file_holders};
#[cfg(target_os = "linux")]
pub use net::{listening_sockets, LsofStrategy, SsStrategy};
#[cfg(target_os = "linux")]
pub use process_query::{get_command_line, read_record};
#[cfg(target_os = "linux")]
pub use process_snapshot::list_processes;
#[cfg(target_os = "linux")]
pub use services::service_main_pid;

use std::time::Duration;

/// Limits applied to external helper commands
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Wall-clock limit per command
    pub timeout: Duration,
    /// Bytes of stdout kept; the rest is discarded
    pub max_output_bytes: usize,
}

impl ProbeConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
    pub const DEFAULT_MAX_OUTPUT: usize = 1024 * 1024;

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            max_output_bytes: Self::DEFAULT_MAX_OUTPUT,
        }
    }
}

/// [`witr_core::PlatformProbe`] backed by `/proc`
///
/// The kernel TCP tables are read at most once per instance and shared by
/// every record read through it, so one instance should serve one analysis.
#[derive(Debug, Clone, Default)]
pub struct LinuxProbe {
    config: ProbeConfig,
    #[cfg(target_os = "linux")]
    tcp_table: std::sync::OnceLock<Vec<procfs::net::TcpNetEntry>>,
}

impl LinuxProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }
}

#[cfg(target_os = "linux")]
mod probe_impl {
    use super::*;
    use std::path::Path;
    use tracing::debug;
    use procfs::net::TcpNetEntry;
    use witr_core::{
        FileContext, ListeningSocket, PlatformProbe, PortStrategy, ProbeResult, ProcessEntry,
        ProcessRecord, SocketState,
    };

    impl LinuxProbe {
        /// Both TCP tables, read on first use
        pub(crate) fn tcp_table(&self) -> &[TcpNetEntry] {
            self.tcp_table.get_or_init(|| {
                net::read_tcp_tables().unwrap_or_else(|e| {
                    debug!(error = %e, "tcp tables unreadable, listeners omitted");
                    Vec::new()
                })
            })
        }
    }

    impl PlatformProbe for LinuxProbe {
        fn snapshot(&self) -> ProbeResult<Vec<ProcessEntry>> {
            list_processes()
        }

        fn read_process(&self, pid: u32) -> ProbeResult<ProcessRecord> {
            read_record(pid, self.tcp_table())
        }

        fn command_line(&self, pid: u32) -> ProbeResult<String> {
            get_command_line(pid)
        }

        fn listening_sockets(&self) -> ProbeResult<Vec<ListeningSocket>> {
            listening_sockets()
        }

        fn fallback_port_strategies(&self) -> Vec<Box<dyn PortStrategy + '_>> {
            vec![
                Box::new(SsStrategy::new(&self.config)),
                Box::new(LsofStrategy::new(&self.config)),
            ]
        }

        fn open_file_holders(&self, path: &Path) -> ProbeResult<Vec<u32>> {
            open_file_holders(path)
        }

        fn service_main_pid(&self, unit: &str) -> ProbeResult<u32> {
            service_main_pid(unit, &self.config)
        }

        fn cgroup_membership(&self, pid: u32) -> ProbeResult<String> {
            process_query::read_cgroup(pid)
        }

        fn socket_state(&self, port: u16) -> Option<SocketState> {
            net::pick_socket_state(port, self.tcp_table())
        }

        fn file_context(&self, pid: u32) -> Option<FileContext> {
            match file_context(pid) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    debug!(pid, error = %e, "file context unavailable");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_output_bytes, 1024 * 1024);

        let config = config.with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_strategy_order() {
        let probe = LinuxProbe::default();
        let names: Vec<_> = witr_core::probe::port_strategies(&probe)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["socket-table", "ss", "lsof"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_tcp_table_read_once_per_instance() {
        use std::net::TcpListener;
        use witr_core::PlatformProbe;

        let listener = TcpListener::bind("127.0.0.1:0").expect("Should bind to port");
        let port = listener.local_addr().expect("Should get local address").port();
        let probe = LinuxProbe::default();

        let first = probe.tcp_table().as_ptr();
        let record = probe
            .read_process(std::process::id())
            .expect("Should read own record");
        assert!(record.listening_ports.contains(&port));
        assert_eq!(probe.tcp_table().as_ptr(), first);

        // bound after the first read, so invisible to this instance
        let late = TcpListener::bind("127.0.0.1:0").expect("Should bind to port");
        let late_port = late.local_addr().expect("Should get local address").port();
        let record = probe
            .read_process(std::process::id())
            .expect("Should read own record");
        assert!(!record.listening_ports.contains(&late_port));
        assert!(LinuxProbe::default()
            .read_process(std::process::id())
            .expect("Should read own record")
            .listening_ports
            .contains(&late_port));
    }
}
