//! Must-gather archive processing
//!
//! This crate walks the XZ tar produced by the artifacts collector,
//! classifies its entries, feeds pod logs to the analysis pipeline and
//! aggregates the findings.

mod aggregate;
mod classifier;
mod config;
mod error;
mod extract;
mod netcheck;
mod results;

pub use aggregate::MustGather;
pub use classifier::{EntryKind, PodLogLocation, classify, normalize_relative_path, pod_log_location};
pub use config::{load_config, parse_config};
pub use error::{ArchiveError, Result};
pub use extract::{ArchiveWalker, EVENT_FILTER_FILE, ExtractSink, WalkSummary};
pub use netcheck::parse_pod_network_checks;
pub use results::{MUST_GATHER_RESULTS_PATH, extract_must_gather, find_entry};

// Re-export types used in our public API
pub use mustgather_logs::PipelineConfig;
pub use mustgather_types::{ErrorCounter, ErrorEtcdLogs, MustGatherLog, PodNetworkChecks, RawFile};
