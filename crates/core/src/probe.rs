//! The platform capability interface
//!
//! Everything the core knows about the running system comes through
//! [`PlatformProbe`]. One implementation exists per operating system; tests
//! substitute an in-memory table.

use crate::error::ProbeResult;
use crate::models::{FileContext, ListeningSocket, ProcessEntry, ProcessRecord, SocketState};
use std::path::Path;

/// Read-only access to process, socket and service state
pub trait PlatformProbe {
    /// Lightweight listing of every running process
    fn snapshot(&self) -> ProbeResult<Vec<ProcessEntry>>;

    /// Full detail for one PID
    fn read_process(&self, pid: u32) -> ProbeResult<ProcessRecord>;

    /// Command line only, arguments joined by spaces
    fn command_line(&self, pid: u32) -> ProbeResult<String>;

    /// Native enumeration of TCP listeners across address families
    fn listening_sockets(&self) -> ProbeResult<Vec<ListeningSocket>>;

    /// Slower port lookups tried, in order, when the native table has no owner
    fn fallback_port_strategies(&self) -> Vec<Box<dyn PortStrategy + '_>> {
        Vec::new()
    }

    /// PIDs holding `path` open (descriptors or memory maps)
    fn open_file_holders(&self, path: &Path) -> ProbeResult<Vec<u32>>;

    /// Main PID of a running service unit
    fn service_main_pid(&self, unit: &str) -> ProbeResult<u32>;

    /// Raw control-group membership (possibly empty)
    fn cgroup_membership(&self, pid: u32) -> ProbeResult<String>;

    /// TCP state of the sockets on a port
    fn socket_state(&self, _port: u16) -> Option<SocketState> {
        None
    }

    /// Descriptor pressure and lock files
    fn file_context(&self, _pid: u32) -> Option<FileContext> {
        None
    }
}

/// One way of finding the listeners on a port
pub trait PortStrategy {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Listening sockets on `port`; owners may be unknown
    fn lookup(&self, port: u16) -> ProbeResult<Vec<ListeningSocket>>;
}

/// Adapts [`PlatformProbe::listening_sockets`] to the strategy list
pub struct NativeSocketTable<'a, P: PlatformProbe + ?Sized> {
    probe: &'a P,
}

impl<'a, P: PlatformProbe + ?Sized> NativeSocketTable<'a, P> {
    pub fn new(probe: &'a P) -> Self {
        Self { probe }
    }
}

impl<P: PlatformProbe + ?Sized> PortStrategy for NativeSocketTable<'_, P> {
    fn name(&self) -> &'static str {
        "socket-table"
    }

    fn lookup(&self, port: u16) -> ProbeResult<Vec<ListeningSocket>> {
        Ok(self
            .probe
            .listening_sockets()?
            .into_iter()
            .filter(|s| s.port == port)
            .collect())
    }
}

/// Full strategy order for a probe: native table first, then its fallbacks
pub fn port_strategies<P: PlatformProbe + ?Sized>(probe: &P) -> Vec<Box<dyn PortStrategy + '_>> {
    let mut strategies: Vec<Box<dyn PortStrategy + '_>> = vec![Box::new(NativeSocketTable::new(probe))];
    strategies.extend(probe.fallback_port_strategies());
    strategies
}
