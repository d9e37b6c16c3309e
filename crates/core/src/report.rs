//! Report structure for lineage analysis results

use crate::ancestry::AncestryChain;
use crate::models::{
    Evidence, FileContext, ProcessEntry, ProcessRecord, Query, SocketState, SourceClassification,
    SourceKind, Warning,
};
use serde::{Deserialize, Serialize};

/// Complete analysis report for one resolved process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// The query that was asked
    pub target: Query,
    /// PID the query resolved to
    pub resolved_pid: u32,
    /// The resolved process
    pub process: ProcessRecord,
    /// Lineage from the oldest ancestor down to the process
    pub ancestry: AncestryChain,
    /// Adjacent same-name pairs in the lineage
    pub restart_count: usize,
    /// Classified source of the process
    pub source: SourceClassification,
    /// Evidence supporting the classification
    pub evidence: Vec<Evidence>,
    /// Warnings about limitations or anomalies
    pub warnings: Vec<Warning>,
    /// Direct children, by PID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProcessEntry>,
    /// TCP state of the queried port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<SocketState>,
    /// Descriptor pressure and held lock files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_context: Option<FileContext>,
}

impl Report {
    pub fn new(target: Query, process: ProcessRecord, ancestry: AncestryChain) -> Self {
        let restart_count = ancestry.restart_count();
        Self {
            target,
            resolved_pid: process.pid,
            process,
            ancestry,
            restart_count,
            source: SourceClassification::unknown(),
            evidence: Vec::new(),
            warnings: Vec::new(),
            children: Vec::new(),
            socket: None,
            file_context: None,
        }
    }

    /// Check if any warnings were raised
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Get the root ancestor (furthest from target)
    pub fn root_ancestor(&self) -> Option<&ProcessRecord> {
        self.ancestry.root()
    }

    pub fn is_service(&self) -> bool {
        self.source.kind == SourceKind::ServiceManager
    }

    pub fn is_interactive(&self) -> bool {
        self.source.kind == SourceKind::InteractiveShell
    }

    pub fn add_warning(&mut self, warning: Warning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}
