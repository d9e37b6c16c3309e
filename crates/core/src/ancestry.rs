//! Process ancestry chain building
//!
//! Walks parent links from a target PID up to the root of its process tree.
//! The chain is ordered oldest first, so the last record is always the target.

use crate::error::{WitrError, WitrResult};
use crate::models::{ProcessRecord, Warning};
use crate::probe::PlatformProbe;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Why a walk ended before reaching a root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ChainStop {
    /// The parent link pointed back at a PID already in the chain
    Cycle { pid: u32 },
    /// The parent exited between reads
    Exited { pid: u32 },
    /// The parent exists but its details are not readable
    PermissionDenied { pid: u32 },
    /// The walk hit the depth bound
    DepthLimit { depth: usize },
}

impl ChainStop {
    pub fn warning(&self) -> Warning {
        match *self {
            ChainStop::Cycle { pid } => Warning::AncestryCycle { pid },
            ChainStop::Exited { pid } => Warning::ParentExited {
                last_known_ppid: pid,
            },
            ChainStop::PermissionDenied { pid } => Warning::AccessDenied { pid },
            ChainStop::DepthLimit { depth } => Warning::AncestryTruncated { depth },
        }
    }
}

/// Ordered lineage of a process, oldest ancestor first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestryChain {
    pub records: Vec<ProcessRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<ChainStop>,
}

impl AncestryChain {
    /// The process the chain was built for
    pub fn target(&self) -> Option<&ProcessRecord> {
        self.records.last()
    }

    /// The oldest known ancestor
    pub fn root(&self) -> Option<&ProcessRecord> {
        self.records.first()
    }

    /// The target's direct parent, if it was read
    pub fn parent(&self) -> Option<&ProcessRecord> {
        self.records.iter().rev().nth(1)
    }

    /// Ancestors only, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.iter().rev().skip(1)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when the walk reached a root without stopping early
    pub fn is_complete(&self) -> bool {
        self.stop.is_none()
    }

    pub fn restart_count(&self) -> usize {
        restart_count(&self.records)
    }
}

/// Build the ancestry chain for `pid`
///
/// Read failures above the target end the walk with a partial chain; only a
/// failure on the target itself is an error.
pub fn build_ancestry<P: PlatformProbe + ?Sized>(
    probe: &P,
    pid: u32,
    max_depth: usize,
) -> WitrResult<AncestryChain> {
    let mut records = Vec::new();
    let mut visited = HashSet::new();
    let mut stop = None;
    let mut current = pid;

    loop {
        if records.len() >= max_depth {
            debug!(pid, depth = max_depth, "ancestry walk hit depth limit");
            stop = Some(ChainStop::DepthLimit { depth: max_depth });
            break;
        }
        if !visited.insert(current) {
            debug!(pid = current, "cycle in parent links");
            stop = Some(ChainStop::Cycle { pid: current });
            break;
        }

        match probe.read_process(current) {
            Ok(record) => {
                let parent = record.parent_pid;
                let root = record.is_root();
                records.push(record);
                if root {
                    break;
                }
                current = parent;
            }
            Err(e) if records.is_empty() => {
                return Err(WitrError::NoAncestryFound {
                    pid,
                    cause: Some(e),
                });
            }
            Err(e) if e.is_access_denied() => {
                debug!(pid = current, "ancestor unreadable, adding placeholder");
                records.push(ProcessRecord::unreadable(current));
                stop = Some(ChainStop::PermissionDenied { pid: current });
                break;
            }
            Err(e) => {
                debug!(pid = current, error = %e, "ancestor vanished during walk");
                stop = Some(ChainStop::Exited { pid: current });
                break;
            }
        }
    }

    records.reverse();
    Ok(AncestryChain { records, stop })
}

/// Number of adjacent same-name pairs in a chain
///
/// A process that re-executes itself or a supervisor that respawns a worker
/// of the same name both show up this way. Placeholders never match.
pub fn restart_count(records: &[ProcessRecord]) -> usize {
    records
        .windows(2)
        .filter(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            !a.synthetic
                && !b.synthetic
                && !a.command_name.is_empty()
                && a.command_name == b.command_name
        })
        .count()
}
