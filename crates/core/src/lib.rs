//! witr-core: answers "why is this process running?"
//!
//! This crate holds everything that does not depend on the operating system:
//! the domain models, the [`PlatformProbe`] contract, target resolution, the
//! ancestry walk, source classification and report rendering.
//!
//! # Modules
//!
//! - [`models`] - Core data structures (Query, ProcessRecord, Evidence, etc.)
//! - [`probe`] - The platform capability interface
//! - [`resolve`] - Query to candidate PIDs
//! - [`ancestry`] - Parent chain construction
//! - [`classifier`] - Source classification and warnings
//! - [`analyzer`] - The full pipeline producing a [`Report`]
//! - [`render`] - Output formatters (human, tree, short, JSON)

pub mod analyzer;
pub mod ancestry;
pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod probe;
pub mod render;
pub mod report;
pub mod resolve;

#[cfg(test)]
mod fake;

pub use analyzer::Analyzer;
pub use ancestry::{build_ancestry, restart_count, AncestryChain, ChainStop};
pub use config::AnalysisConfig;
pub use error::{ProbeError, ProbeResult, WitrError, WitrResult};
pub use models::{
    Candidate, Confidence, Evidence, EvidenceSource, FileContext, ListeningSocket, ProcessEntry,
    ProcessHealth, ProcessRecord, Query, SocketState, SourceClassification, SourceKind, TargetKind,
    Warning,
};
pub use probe::{PlatformProbe, PortStrategy};
pub use report::Report;
pub use resolve::Resolver;
