use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use mustgather_logs::{AGGREGATE_HOUR_WINDOWS, LogPipeline, PipelineConfig, slow_request_stats};
use mustgather_types::{ErrorCounter, ErrorEtcdLogs, MustGatherLog, PodNetworkChecks, RawFile};

use crate::error::Result;
use crate::extract::{ArchiveWalker, ExtractSink};

/// Everything extracted from one must-gather archive
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MustGather {
    /// Directory extracted files are written to, in-memory only when unset
    #[serde(skip)]
    save_dir: Option<PathBuf>,

    #[serde(skip)]
    config: PipelineConfig,

    /// Error counters summed across every pod log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_counters: Option<ErrorCounter>,

    /// etcd counters and slow request statistics across every member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_etcd_logs: Option<ErrorEtcdLogs>,

    /// Pod logs with at least one finding
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub namespace_errors: Vec<MustGatherLog>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raw_files: Vec<RawFile>,

    pub pod_network_checks: PodNetworkChecks,
}

impl MustGather {
    pub fn new(save_dir: Option<PathBuf>, config: PipelineConfig) -> Self {
        Self {
            save_dir,
            config,
            ..Default::default()
        }
    }

    /// Build from an optional archive, falling back to an empty result
    /// when the archive is absent or unreadable
    pub async fn load_or_empty(
        data: Option<Vec<u8>>,
        save_dir: Option<PathBuf>,
        config: PipelineConfig,
    ) -> Self {
        let mut must_gather = Self::new(save_dir, config);
        let Some(data) = data else {
            warn!("must-gather archive not found, continuing without must-gather results");
            return must_gather;
        };
        if let Err(e) = must_gather.process(data).await {
            warn!("unable to process must-gather archive: {}", e);
        }
        must_gather
    }

    /// Process the bytes of an XZ tar must-gather.
    ///
    /// Findings collected before a stream error are kept and aggregated;
    /// the error is returned afterwards.
    pub async fn process(&mut self, data: Vec<u8>) -> Result<()> {
        debug!("Processing must-gather: reading {} bytes", data.len());
        let pipeline = LogPipeline::start(&self.config);
        let submitter = pipeline.submitter();
        let sink = Arc::new(ExtractSink::default());

        let walk_sink = Arc::clone(&sink);
        let save_dir = self.save_dir.clone();
        let walked = tokio::task::spawn_blocking(move || {
            let walker = ArchiveWalker::new(save_dir.as_deref(), &submitter, &walk_sink);
            walker.walk_xz(Cursor::new(data))
        })
        .await;

        // every dispatched analysis completes before aggregation
        let logs = pipeline.finish().await;
        debug!("Processing must-gather: {} pod logs with findings", logs.len());
        self.namespace_errors.extend(logs);
        self.raw_files.extend(std::mem::take(&mut *sink.raw_files.lock()));
        self.pod_network_checks
            .append(std::mem::take(&mut *sink.pod_network_checks.lock()));

        debug!("Processing must-gather: calculating errors");
        self.aggregate_counters();

        let summary = walked??;
        debug!(
            "Processing must-gather: done, {} entries, {} pod logs, {} raw files, {} network checks, {} failed",
            summary.entries, summary.pod_logs, summary.raw_files, summary.network_checks, summary.failed
        );
        Ok(())
    }

    /// Merge the per-log findings into the root counters and recompute the
    /// etcd statistics from every member's slow request lines. The
    /// per-log line buffers are released.
    pub fn aggregate_counters(&mut self) {
        let mut counters: Option<ErrorCounter> = None;
        let mut etcd_counters: Option<ErrorCounter> = None;
        let mut etcd_lines: Vec<String> = Vec::new();
        let mut has_etcd = false;

        for log in &mut self.namespace_errors {
            if let Some(found) = &log.error_counters {
                counters.get_or_insert_with(ErrorCounter::new).merge_from(found);
            }
            if let Some(etcd) = &mut log.error_etcd_logs {
                debug!("Aggregating etcd logs of pod {}", log.pod);
                has_etcd = true;
                etcd_lines.append(&mut etcd.buffer);
                if let Some(found) = &etcd.error_counters {
                    etcd_counters.get_or_insert_with(ErrorCounter::new).merge_from(found);
                }
            }
        }

        self.error_counters = counters;
        self.error_etcd_logs = has_etcd.then(|| {
            let (filter_request_slow_hour, filter_request_slow_all) =
                slow_request_stats(etcd_lines.iter().map(String::as_str), AGGREGATE_HOUR_WINDOWS);
            ErrorEtcdLogs {
                error_counters: etcd_counters,
                filter_request_slow_all,
                filter_request_slow_hour,
                buffer: Vec::new(),
            }
        });
    }

    /// True when nothing was extracted
    pub fn is_empty(&self) -> bool {
        self.error_counters.is_none()
            && self.error_etcd_logs.is_none()
            && self.namespace_errors.is_empty()
            && self.raw_files.is_empty()
            && self.pod_network_checks.is_empty()
    }
}
