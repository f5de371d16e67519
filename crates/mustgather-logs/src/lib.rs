//! Log analysis for must-gather archives
//!
//! This crate provides error pattern counting, etcd slow request
//! bucketing and statistics, and the bounded pod log pipeline.

mod buckets;
mod config;
mod etcd;
mod filter;
mod pipeline;
mod stats;

pub use buckets::{
    BUCKET_500MS_INF, BUCKET_1000MS_INF, BUCKET_ALL, BucketGroup, Buckets, COARSE_BUCKETS,
    FINE_BUCKETS, MIN_SLOW_REQUEST_MS, coarse_band, fine_band,
};
pub use config::{PipelineConfig, RATE_LIMIT_ENV, RATE_LIMIT_RANGE_MS, parse_rate_limit};
pub use etcd::{
    AGGREGATE_HOUR_WINDOWS, CURRENT_LOG_SUFFIX, ETCD_CONTAINER, ETCD_NAMESPACE, GroupBy,
    LineOutcome, PER_LOG_HOUR_WINDOWS, SLOW_APPLY_MARKER, SlowApplyFilter, SlowApplySample,
    analyze_etcd_log, inspect_line, is_etcd_current_log, parse_took_ms, slow_request_stats,
};
pub use filter::{
    COMMON_ERROR_PATTERNS, ETCD_ERROR_PATTERNS, ErrorPatternMatcher, IMPLICIT_ERROR_PATTERN,
};
pub use pipeline::{LogPipeline, LogSubmitter, analyze_pod_log};
pub use stats::{format_outliers, summarize};

// Re-export types used in our public API
pub use mustgather_types::{BucketFilterStat, ErrorCounter, ErrorEtcdLogs, MustGatherLog};
