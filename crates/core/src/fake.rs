//! In-memory probe for unit tests

use crate::error::{ProbeError, ProbeResult};
use crate::models::{FileContext, ListeningSocket, ProcessEntry, ProcessRecord, SocketState};
use crate::probe::{PlatformProbe, PortStrategy};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Canned answers for one fallback strategy
#[derive(Clone)]
pub struct FakeStrategy {
    pub name: &'static str,
    pub result: Result<Vec<ListeningSocket>, String>,
}

impl PortStrategy for FakeStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn lookup(&self, port: u16) -> ProbeResult<Vec<ListeningSocket>> {
        match &self.result {
            Ok(sockets) => Ok(sockets.iter().filter(|s| s.port == port).cloned().collect()),
            Err(message) => Err(ProbeError::CommandFailed {
                program: self.name,
                message: message.clone(),
            }),
        }
    }
}

#[derive(Default)]
pub struct FakeProbe {
    pub records: BTreeMap<u32, ProcessRecord>,
    pub denied: HashSet<u32>,
    pub sockets: Vec<ListeningSocket>,
    pub fallbacks: Vec<FakeStrategy>,
    pub holders: HashMap<PathBuf, Vec<u32>>,
    pub services: HashMap<String, u32>,
    pub cgroups: HashMap<u32, String>,
    pub states: HashMap<u16, SocketState>,
    pub files: HashMap<u32, FileContext>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process with a command line equal to its name
    pub fn with(mut self, pid: u32, parent_pid: u32, name: &str) -> Self {
        let mut record = ProcessRecord::new(pid, parent_pid, name);
        record.cmdline = name.to_string();
        self.records.insert(pid, record);
        self
    }

    pub fn with_cmdline(mut self, pid: u32, parent_pid: u32, name: &str, cmdline: &str) -> Self {
        let mut record = ProcessRecord::new(pid, parent_pid, name);
        record.cmdline = cmdline.to_string();
        self.records.insert(pid, record);
        self
    }

    pub fn with_record(mut self, record: ProcessRecord) -> Self {
        self.records.insert(record.pid, record);
        self
    }

    /// A process that shows up in the snapshot but cannot be read
    pub fn with_denied(mut self, pid: u32, parent_pid: u32, name: &str) -> Self {
        self.records
            .insert(pid, ProcessRecord::new(pid, parent_pid, name));
        self.denied.insert(pid);
        self
    }

    pub fn with_listener(mut self, port: u16, address: &str, pid: Option<u32>) -> Self {
        self.sockets.push(ListeningSocket {
            port,
            address: address.to_string(),
            pid,
        });
        self
    }

    pub fn with_fallback(mut self, strategy: FakeStrategy) -> Self {
        self.fallbacks.push(strategy);
        self
    }

    pub fn with_holders(mut self, path: impl Into<PathBuf>, pids: &[u32]) -> Self {
        self.holders.insert(path.into(), pids.to_vec());
        self
    }

    pub fn with_service(mut self, unit: &str, pid: u32) -> Self {
        self.services.insert(unit.to_string(), pid);
        self
    }

    pub fn with_cgroup(mut self, pid: u32, membership: &str) -> Self {
        self.cgroups.insert(pid, membership.to_string());
        self
    }
}

impl PlatformProbe for FakeProbe {
    fn snapshot(&self) -> ProbeResult<Vec<ProcessEntry>> {
        Ok(self
            .records
            .values()
            .map(|r| ProcessEntry {
                pid: r.pid,
                parent_pid: r.parent_pid,
                command_name: r.command_name.clone(),
            })
            .collect())
    }

    fn read_process(&self, pid: u32) -> ProbeResult<ProcessRecord> {
        if self.denied.contains(&pid) {
            return Err(ProbeError::AccessDenied { pid });
        }
        self.records
            .get(&pid)
            .cloned()
            .ok_or(ProbeError::ProcessNotFound { pid })
    }

    fn command_line(&self, pid: u32) -> ProbeResult<String> {
        self.read_process(pid).map(|r| r.cmdline)
    }

    fn listening_sockets(&self) -> ProbeResult<Vec<ListeningSocket>> {
        Ok(self.sockets.clone())
    }

    fn fallback_port_strategies(&self) -> Vec<Box<dyn PortStrategy + '_>> {
        self.fallbacks
            .iter()
            .cloned()
            .map(|s| Box::new(s) as Box<dyn PortStrategy>)
            .collect()
    }

    fn open_file_holders(&self, path: &Path) -> ProbeResult<Vec<u32>> {
        Ok(self.holders.get(path).cloned().unwrap_or_default())
    }

    fn service_main_pid(&self, unit: &str) -> ProbeResult<u32> {
        let unit = unit.trim_end_matches(".service");
        self.services
            .get(unit)
            .copied()
            .ok_or_else(|| ProbeError::NotRunning {
                unit: unit.to_string(),
            })
    }

    fn cgroup_membership(&self, pid: u32) -> ProbeResult<String> {
        Ok(self.cgroups.get(&pid).cloned().unwrap_or_default())
    }

    fn socket_state(&self, port: u16) -> Option<SocketState> {
        self.states.get(&port).cloned()
    }

    fn file_context(&self, pid: u32) -> Option<FileContext> {
        self.files.get(&pid).cloned()
    }
}
