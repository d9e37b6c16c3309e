//! Full process analysis and report generation
//!
//! Ties resolution, ancestry and classification together into a [`Report`].

use crate::ancestry::build_ancestry;
use crate::classifier::{classify, detect_warnings};
use crate::config::AnalysisConfig;
use crate::error::{WitrError, WitrResult};
use crate::models::{Candidate, ProcessEntry, Query, TargetKind};
use crate::probe::PlatformProbe;
use crate::report::Report;
use crate::resolve::{parse_port, Resolver};
use tracing::debug;

pub struct Analyzer<'a, P: PlatformProbe + ?Sized> {
    probe: &'a P,
    config: &'a AnalysisConfig,
}

impl<'a, P: PlatformProbe + ?Sized> Analyzer<'a, P> {
    pub fn new(probe: &'a P, config: &'a AnalysisConfig) -> Self {
        Self { probe, config }
    }

    /// Candidate PIDs for a query
    pub fn resolve(&self, query: &Query) -> WitrResult<Vec<u32>> {
        Resolver::new(self.probe, self.config).resolve(query)
    }

    /// Resolve a query to exactly one process and explain it
    ///
    /// Several matches are reported as [`WitrError::AmbiguousMatch`] with a
    /// disambiguation list rather than picking one.
    pub fn analyze(&self, query: &Query) -> WitrResult<Report> {
        let pids = self.resolve(query)?;
        match pids.as_slice() {
            [pid] => self.build_report(query, *pid),
            _ => Err(WitrError::AmbiguousMatch {
                query: query.clone(),
                candidates: self.candidates(&pids),
            }),
        }
    }

    /// Build a report for a known PID
    pub fn analyze_pid(&self, pid: u32) -> WitrResult<Report> {
        self.build_report(&Query::pid(pid.to_string()), pid)
    }

    /// Name and command line for each PID, for a disambiguation menu
    pub fn candidates(&self, pids: &[u32]) -> Vec<Candidate> {
        pids.iter()
            .map(|&pid| match self.probe.read_process(pid) {
                Ok(record) => Candidate {
                    pid,
                    command_name: record.name().to_string(),
                    cmdline: record.cmdline,
                },
                Err(e) => {
                    debug!(pid, error = %e, "candidate vanished");
                    Candidate {
                        pid,
                        command_name: "<exited>".to_string(),
                        cmdline: String::new(),
                    }
                }
            })
            .collect()
    }

    /// Direct children of `pid`, sorted by PID
    pub fn children(&self, pid: u32) -> WitrResult<Vec<ProcessEntry>> {
        let mut children: Vec<ProcessEntry> = self
            .probe
            .snapshot()?
            .into_iter()
            .filter(|e| e.parent_pid == pid && e.pid != pid)
            .collect();
        children.sort_by_key(|e| e.pid);
        Ok(children)
    }

    fn build_report(&self, query: &Query, pid: u32) -> WitrResult<Report> {
        let chain = build_ancestry(self.probe, pid, self.config.max_depth)?;
        let process = chain
            .target()
            .cloned()
            .ok_or(WitrError::NoAncestryFound { pid, cause: None })?;

        let classified = classify(self.probe, &chain, self.config.confidence_threshold);
        let warnings = detect_warnings(&chain);

        let mut report = Report::new(query.clone(), process, chain);
        report.source = classified.classification;
        report.evidence = classified.evidence;
        for warning in warnings.into_iter().chain(classified.warnings) {
            report.add_warning(warning);
        }

        if query.kind == TargetKind::Port {
            report.socket = parse_port(&query.value)
                .ok()
                .and_then(|port| self.probe.socket_state(port));
        }
        report.file_context = self
            .probe
            .file_context(pid)
            .filter(|ctx| ctx.is_noteworthy());

        Ok(report)
    }
}
