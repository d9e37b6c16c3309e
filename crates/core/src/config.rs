//! Runtime knobs for one analysis run
//!
//! Built once at startup and handed to the resolver, ancestry builder and
//! classifier; nothing in the core reads process-global state.

use serde::{Deserialize, Serialize};

/// Default upper bound on ancestry walks
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Classifications below this score are reported as uncertain
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Processes spawned to inspect other processes; never valid name matches
pub const DEFAULT_EXCLUDED_HELPERS: &[&str] = &[
    "lsof",
    "ss",
    "netstat",
    "systemctl",
    "fuser",
    "sockstat",
    "fstat",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// PID of the running tool
    pub self_pid: u32,
    /// PID of the process that invoked the tool (usually a shell)
    pub parent_pid: u32,
    pub confidence_threshold: f32,
    pub max_depth: usize,
    /// Exact command names skipped by name resolution
    pub excluded_helpers: Vec<String>,
}

impl AnalysisConfig {
    /// Configuration describing the current process
    pub fn for_current_process() -> Self {
        #[cfg(unix)]
        let parent_pid = std::os::unix::process::parent_id();
        #[cfg(not(unix))]
        let parent_pid = 0;
        Self::new(std::process::id(), parent_pid)
    }

    pub fn new(self_pid: u32, parent_pid: u32) -> Self {
        Self {
            self_pid,
            parent_pid,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_depth: DEFAULT_MAX_DEPTH,
            excluded_helpers: DEFAULT_EXCLUDED_HELPERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Is this command name one of our own inspection helpers?
    pub fn is_helper(&self, command_name: &str) -> bool {
        let lower = command_name.to_lowercase();
        lower.contains("grep") || self.excluded_helpers.iter().any(|h| *h == lower)
    }

    /// Is this PID the tool itself or its invoking shell?
    pub fn is_self(&self, pid: u32) -> bool {
        pid == self.self_pid || pid == self.parent_pid
    }
}
