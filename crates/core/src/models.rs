//! Core domain models for witr
//!
//! These types are OS-agnostic and carry the point-in-time process data the
//! resolver, ancestry builder and classifier exchange.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// What kind of selector a query carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Process or service name
    Name,
    /// Process ID
    Pid,
    /// Listening TCP port
    Port,
    /// Path of a file some process holds open
    File,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Name => write!(f, "name"),
            TargetKind::Pid => write!(f, "pid"),
            TargetKind::Port => write!(f, "port"),
            TargetKind::File => write!(f, "file"),
        }
    }
}

/// The input target for the query
///
/// The value is kept as typed by the user; parsing happens during resolution
/// so malformed input surfaces as an `InvalidInput` error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub kind: TargetKind,
    pub value: String,
    /// Require exact name matches instead of substring matches
    #[serde(default)]
    pub exact: bool,
}

impl Query {
    pub fn new(kind: TargetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            exact: false,
        }
    }

    pub fn pid(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Pid, value)
    }

    pub fn port(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Port, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Name, value)
    }

    pub fn file(value: impl Into<String>) -> Self {
        Self::new(TargetKind::File, value)
    }

    /// Switch between exact and fuzzy name matching
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TargetKind::Pid => write!(f, "PID {}", self.value),
            TargetKind::Port => write!(f, "port {}", self.value),
            TargetKind::Name => write!(f, "\"{}\"", self.value),
            TargetKind::File => write!(f, "file {}", self.value),
        }
    }
}

/// A lightweight row from the process table snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent_pid: u32,
    /// Short command name (kernel `comm`, not the full path)
    pub command_name: String,
}

/// Coarse health of a process, derived from its kernel run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessHealth {
    /// Running or sleeping normally
    Healthy,
    /// Blocked in uninterruptible sleep (usually I/O)
    DiskSleep,
    /// Stopped by a signal or a tracer
    Stopped,
    /// Exited but not yet reaped by its parent
    Zombie,
    /// Being torn down
    Dead,
    #[default]
    Unknown,
}

impl ProcessHealth {
    /// Map a `/proc/<pid>/stat` state character
    pub fn from_state_char(state: char) -> Self {
        match state {
            'R' | 'S' | 'I' => ProcessHealth::Healthy,
            'D' => ProcessHealth::DiskSleep,
            'T' | 't' => ProcessHealth::Stopped,
            'Z' => ProcessHealth::Zombie,
            'X' | 'x' => ProcessHealth::Dead,
            _ => ProcessHealth::Unknown,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProcessHealth::Healthy)
    }
}

impl std::fmt::Display for ProcessHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessHealth::Healthy => write!(f, "healthy"),
            ProcessHealth::DiskSleep => write!(f, "uninterruptible sleep"),
            ProcessHealth::Stopped => write!(f, "stopped"),
            ProcessHealth::Zombie => write!(f, "zombie"),
            ProcessHealth::Dead => write!(f, "dead"),
            ProcessHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// Full detail for a single process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID
    pub pid: u32,
    /// Parent process ID (0 for kernel-spawned roots)
    pub parent_pid: u32,
    /// Short command name
    pub command_name: String,
    /// Full command line, arguments joined by spaces (empty when unreadable)
    pub cmdline: String,
    /// Resolved executable path
    pub exe_path: Option<String>,
    /// Owning user name (or numeric uid when it has no passwd entry)
    pub user: Option<String>,
    /// Process start time
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    /// Current working directory
    pub working_dir: Option<String>,
    /// TCP ports this process listens on
    pub listening_ports: BTreeSet<u16>,
    /// Local addresses of those listeners
    pub bind_addresses: BTreeSet<String>,
    /// Environment in `KEY=value` form, in the order the process holds it
    pub environment: Vec<String>,
    pub health: ProcessHealth,
    /// Placeholder for an ancestor whose details could not be read
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl ProcessRecord {
    /// A bare record with only identity filled in
    pub fn new(pid: u32, parent_pid: u32, command_name: impl Into<String>) -> Self {
        Self {
            pid,
            parent_pid,
            command_name: command_name.into(),
            cmdline: String::new(),
            exe_path: None,
            user: None,
            start_time: None,
            working_dir: None,
            listening_ports: BTreeSet::new(),
            bind_addresses: BTreeSet::new(),
            environment: Vec::new(),
            health: ProcessHealth::Unknown,
            synthetic: false,
        }
    }

    /// Stand-in for a process that exists but whose record is unreadable
    pub fn unreadable(pid: u32) -> Self {
        Self {
            synthetic: true,
            ..Self::new(pid, 0, "")
        }
    }

    /// Display name: the short command name, else the executable's file name
    pub fn name(&self) -> &str {
        if !self.command_name.is_empty() {
            return &self.command_name;
        }
        self.exe_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .unwrap_or("<unknown>")
    }

    /// True for the top of a process tree
    pub fn is_root(&self) -> bool {
        self.parent_pid == 0 || self.pid == 1
    }

    /// First wildcard address the process listens on, if any
    pub fn public_address(&self) -> Option<&str> {
        self.bind_addresses
            .iter()
            .map(String::as_str)
            .find(|a| matches!(*a, "0.0.0.0" | "::" | "*"))
    }
}

/// A TCP listening socket and, when attributable, its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningSocket {
    pub port: u16,
    pub address: String,
    /// None when the owning process could not be determined
    pub pid: Option<u32>,
}

/// TCP state of a port, with a hint for problem states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketState {
    pub port: u16,
    pub state: String,
    pub local_addr: String,
    pub remote_addr: String,
    pub explanation: Option<String>,
    pub workaround: Option<String>,
}

impl SocketState {
    /// Build a state entry and attach the explanation for well-known states
    pub fn new(port: u16, state: &str, local_addr: String, remote_addr: String) -> Self {
        let (explanation, workaround) = match state {
            "LISTEN" => (Some("Actively listening for connections"), None),
            "TIME_WAIT" => (
                Some("Connection closed, waiting for delayed packets"),
                Some("Wait for timeout (usually 60-240s) or reuse port"),
            ),
            "CLOSE_WAIT" => (
                Some("Remote side closed connection, local side still has it open"),
                Some("Check if application is leaking connections or hanging"),
            ),
            "ESTABLISHED" => (Some("Active connection established"), None),
            "SYN_SENT" => (
                Some("Attempting to establish connection"),
                Some("Check firewall or if remote host is up"),
            ),
            "SYN_RECV" => (Some("Received connection request, sending ack"), None),
            "FIN_WAIT1" | "FIN_WAIT2" => (
                Some("Local side closed, waiting for remote to finish"),
                None,
            ),
            _ => (None, None),
        };
        Self {
            port,
            state: state.to_string(),
            local_addr,
            remote_addr,
            explanation: explanation.map(str::to_string),
            workaround: workaround.map(str::to_string),
        }
    }

    /// States that usually explain "address already in use" trouble
    pub fn is_problematic(&self) -> bool {
        matches!(
            self.state.as_str(),
            "TIME_WAIT" | "CLOSE_WAIT" | "FIN_WAIT1" | "FIN_WAIT2"
        )
    }
}

/// Open-descriptor pressure and lock-like files for a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    pub open_files: usize,
    /// Soft limit on open files (0 when unknown)
    pub file_limit: u64,
    pub locked_files: Vec<String>,
}

impl FileContext {
    /// Percentage of the descriptor limit in use
    pub fn usage_percent(&self) -> Option<f64> {
        if self.file_limit == 0 {
            return None;
        }
        Some(self.open_files as f64 / self.file_limit as f64 * 100.0)
    }

    /// Worth reporting: lock files held, or more than half the limit used
    pub fn is_noteworthy(&self) -> bool {
        !self.locked_files.is_empty() || self.usage_percent().is_some_and(|p| p > 50.0)
    }
}

/// One entry in a disambiguation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub pid: u32,
    pub command_name: String,
    pub cmdline: String,
}

/// Classification of the source that started/keeps the process running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Control group places the lineage inside a container runtime
    Container,
    /// Launched by init, systemd or another supervisor
    ServiceManager,
    /// Launched by cron, at or another scheduler
    Cron,
    /// Started from a user's shell
    InteractiveShell,
    /// Origin could not be determined
    Unknown,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Container => write!(f, "Container"),
            SourceKind::ServiceManager => write!(f, "Service Manager"),
            SourceKind::Cron => write!(f, "Scheduled Task"),
            SourceKind::InteractiveShell => write!(f, "Interactive Shell"),
            SourceKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Confidence level in a classification or piece of evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Low confidence - speculative or incomplete data
    Low,
    /// Medium confidence - likely correct but not verified
    Medium,
    /// High confidence - verified from authoritative source
    High,
}

impl Confidence {
    /// Bucket a numeric score
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Confidence::High
        } else if score >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// A piece of evidence supporting a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// The fact or observation
    pub fact: String,
    /// Confidence in this evidence
    pub confidence: Confidence,
    /// Where the fact came from
    pub source: EvidenceSource,
    /// Additional details
    pub details: Option<String>,
}

/// The mechanism that provided evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Parent/child links and command names
    ProcessTable,
    /// `/proc/<pid>/cgroup` membership
    ControlGroup,
    /// Process command line
    CommandLine,
    /// Heuristic/inference
    Heuristic,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceSource::ProcessTable => write!(f, "Process Table"),
            EvidenceSource::ControlGroup => write!(f, "Control Group"),
            EvidenceSource::CommandLine => write!(f, "Command Line"),
            EvidenceSource::Heuristic => write!(f, "Heuristic"),
        }
    }
}

/// Warnings about limitations or anomalies in the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum Warning {
    /// Parent process has exited, ancestry chain is incomplete
    ParentExited { last_known_ppid: u32 },
    /// Access denied to an ancestor's details
    AccessDenied { pid: u32 },
    /// The process table links back onto itself
    AncestryCycle { pid: u32 },
    /// Ancestry chain was truncated (too deep)
    AncestryTruncated { depth: usize },
    /// Only the target itself could be read
    ShallowAncestry,
    /// More ancestors than a normal process tree has
    DeepAncestry { depth: usize },
    /// The top of the chain is not init
    RootNotInit { pid: u32, name: String },
    /// An ancestor's command line is empty or unreadable
    MissingCommandLine { pid: u32, name: String },
    /// Target runs with uid 0
    RunningAsRoot,
    /// Target listens on a wildcard address
    PublicListener { address: String },
    /// Same command repeated down the chain
    Restarted { count: usize },
    /// Target is not in a normal run state
    Unhealthy { health: ProcessHealth },
    /// Classification fell below the confidence threshold
    LowConfidence { kind: SourceKind, confidence: f32 },
    /// Generic warning
    Other(String),
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::ParentExited { last_known_ppid } => {
                write!(f, "Parent process (PID {}) has exited", last_known_ppid)
            }
            Warning::AccessDenied { pid } => {
                write!(f, "Access denied reading PID {}; ancestry is partial", pid)
            }
            Warning::AncestryCycle { pid } => {
                write!(f, "Cycle detected in process table at PID {}", pid)
            }
            Warning::AncestryTruncated { depth } => {
                write!(f, "Ancestry chain truncated at depth {}", depth)
            }
            Warning::ShallowAncestry => {
                write!(f, "No ancestors could be read; lineage is unknown")
            }
            Warning::DeepAncestry { depth } => {
                write!(f, "Unusually deep ancestry ({} levels)", depth)
            }
            Warning::RootNotInit { pid, name } => write!(
                f,
                "Ancestry does not reach init; top is {} (PID {})",
                name, pid
            ),
            Warning::MissingCommandLine { pid, name } => {
                write!(f, "No readable command line for {} (PID {})", name, pid)
            }
            Warning::RunningAsRoot => write!(f, "Process is running as root"),
            Warning::PublicListener { address } => {
                write!(f, "Process is listening on a public interface ({})", address)
            }
            Warning::Restarted { count } => {
                write!(f, "Process or ancestor has been restarted {} times", count)
            }
            Warning::Unhealthy { health } => write!(f, "Process is {}", health),
            Warning::LowConfidence { kind, confidence } => write!(
                f,
                "Source classification is uncertain ({} at {:.0}% confidence)",
                kind,
                confidence * 100.0
            ),
            Warning::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// The source classification with confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceClassification {
    /// The determined source kind
    pub kind: SourceKind,
    /// Short label naming the launcher (e.g. "systemd", "docker", "bash")
    pub label: String,
    /// Score in [0, 1]
    pub confidence: f32,
    /// Human-readable explanation
    pub description: String,
}

impl SourceClassification {
    /// Create an unknown classification
    pub fn unknown() -> Self {
        Self {
            kind: SourceKind::Unknown,
            label: "unknown".to_string(),
            confidence: 0.0,
            description: "Could not determine process origin".to_string(),
        }
    }

    /// Coarse confidence bucket
    pub fn level(&self) -> Confidence {
        Confidence::from_score(self.confidence)
    }

    /// Whether the score clears the given threshold
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}
