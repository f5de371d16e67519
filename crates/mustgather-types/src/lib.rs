//! Shared types for must-gather analysis
//!
//! This crate contains the data structures produced by the archive
//! extractor and the log analyzers, and consumed by report layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Error Counters
// ============================================================================

/// Reserved counter key holding the sum of every pattern count
pub const TOTAL_KEY: &str = "total";

/// Occurrence count per error pattern, plus the reserved `total` key.
///
/// Counters are produced as `Option<ErrorCounter>`: `None` means nothing
/// matched, which is different from a counter holding zeros.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCounter(BTreeMap<String, u64>);

impl ErrorCounter {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Count for a pattern (0 when absent)
    pub fn get(&self, pattern: &str) -> u64 {
        self.0.get(pattern).copied().unwrap_or(0)
    }

    /// Value of the `total` key (0 when absent)
    pub fn total(&self) -> u64 {
        self.get(TOTAL_KEY)
    }

    /// Add `count` to a pattern, creating it when missing
    pub fn add(&mut self, pattern: &str, count: u64) {
        *self.0.entry(pattern.to_string()).or_insert(0) += count;
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.0.contains_key(pattern)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Sum every key of `other` into this counter
    pub fn merge_from(&mut self, other: &ErrorCounter) {
        for (pattern, count) in &other.0 {
            self.add(pattern, *count);
        }
    }

    /// Key-wise sum of two optional counters. `None` is the identity.
    pub fn merge(a: Option<&ErrorCounter>, b: Option<&ErrorCounter>) -> Option<ErrorCounter> {
        match (a, b) {
            (None, None) => None,
            (Some(c), None) | (None, Some(c)) => Some(c.clone()),
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                merged.merge_from(b);
                Some(merged)
            }
        }
    }
}

impl FromIterator<(String, u64)> for ErrorCounter {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut counter = Self::new();
        for (pattern, count) in iter {
            counter.add(&pattern, count);
        }
        counter
    }
}

impl<const N: usize> From<[(&str, u64); N]> for ErrorCounter {
    fn from(entries: [(&str, u64); N]) -> Self {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

// ============================================================================
// Pod Log Findings
// ============================================================================

/// Findings extracted from one pod log file of the must-gather
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MustGatherLog {
    /// Archive-relative path of the log file
    pub path: String,

    pub namespace: String,
    pub pod: String,
    pub container: String,

    /// Generic error pattern counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_counters: Option<ErrorCounter>,

    /// etcd analysis, only for the etcd member's current log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_etcd_logs: Option<ErrorEtcdLogs>,
}

impl MustGatherLog {
    pub fn new(path: String, namespace: String, pod: String, container: String) -> Self {
        Self {
            path,
            namespace,
            pod,
            container,
            error_counters: None,
            error_etcd_logs: None,
        }
    }

    /// Whether the log carries anything worth keeping
    pub fn processed(&self) -> bool {
        self.error_counters.as_ref().is_some_and(|c| !c.is_empty()) || self.error_etcd_logs.is_some()
    }
}

// ============================================================================
// etcd Latency Statistics
// ============================================================================

/// etcd-specific findings: error counters and slow request statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorEtcdLogs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_counters: Option<ErrorCounter>,

    /// Statistics over every sample, keyed by `all`
    pub filter_request_slow_all: BTreeMap<String, BucketFilterStat>,

    /// Statistics for the most recent hours, keyed by `YYYY-MM-DDTHH`
    pub filter_request_slow_hour: BTreeMap<String, BucketFilterStat>,

    /// Raw "apply request took too long" lines, kept for global re-bucketing
    #[serde(skip)]
    pub buffer: Vec<String>,
}

/// Quartile fence outliers of a sample set
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Outliers {
    /// Outside the inner fences (1.5 IQR) but inside the outer fences
    pub mild: Vec<f64>,
    /// Outside the outer fences (3 IQR)
    pub extreme: Vec<f64>,
}

/// Descriptive statistics of one sample population, in milliseconds
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LatencySummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub p90: f64,
    pub p99: f64,
    pub p999: f64,
    pub outliers: Outliers,
}

/// Read-only snapshot of one aggregation key's latency histogram.
///
/// The `Stat*` strings keep the `"<value> (ms)"` layout report consumers
/// parse; `summary` carries the same numbers unformatted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketFilterStat {
    pub request_count: u64,
    #[serde(rename = "Higher500ms")]
    pub higher_500ms: String,
    #[serde(rename = "Higher500msCount")]
    pub higher_500ms_count: u64,
    #[serde(rename = "Higher500msPercent")]
    pub higher_500ms_percent: f64,
    /// Band name to `"<count> (<pct>%)"`
    pub buckets: BTreeMap<String, String>,
    pub stat_count: String,
    pub stat_min: String,
    pub stat_median: String,
    pub stat_mean: String,
    pub stat_max: String,
    pub stat_sum: String,
    pub stat_stddev: String,
    pub stat_perc90: String,
    pub stat_perc99: String,
    pub stat_perc999: String,
    pub stat_outliers: String,
    pub summary: LatencySummary,
}

// ============================================================================
// Raw Files
// ============================================================================

/// A small artifact copied verbatim from the must-gather
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_alias: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data: String,
}

// ============================================================================
// Pod Network Connectivity Checks
// ============================================================================

/// Totals of one PodNetworkConnectivityCheck object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PodNetworkCheck {
    pub name: String,
    pub spec_source: String,
    pub spec_target: String,
    pub total_failures: u64,
    pub total_outages: u64,
    pub total_success: u64,
}

/// A failed connectivity probe
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCheckFailure {
    pub name: String,
    pub time: String,
    pub reason: String,
    pub latency: String,
    pub message: String,
}

/// A connectivity outage window
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkOutage {
    pub name: String,
    pub start: String,
    pub end: String,
    pub message: String,
}

/// Aggregate of every connectivity check found in the must-gather
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PodNetworkChecks {
    pub total_failures: u64,
    pub total_outages: u64,
    pub total_success: u64,
    pub checks: Vec<PodNetworkCheck>,
    pub outages: Vec<NetworkOutage>,
    pub failures: Vec<NetworkCheckFailure>,
}

impl PodNetworkChecks {
    /// Append one check with its failures and outages, updating totals
    pub fn insert_check(
        &mut self,
        check: PodNetworkCheck,
        failures: Vec<NetworkCheckFailure>,
        outages: Vec<NetworkOutage>,
    ) {
        self.total_failures += check.total_failures;
        self.total_outages += check.total_outages;
        self.total_success += check.total_success;
        self.checks.push(check);
        self.failures.extend(failures);
        self.outages.extend(outages);
    }

    /// Move every check of `other` into this aggregate
    pub fn append(&mut self, other: PodNetworkChecks) {
        self.total_failures += other.total_failures;
        self.total_outages += other.total_outages;
        self.total_success += other.total_success;
        self.checks.extend(other.checks);
        self.failures.extend(other.failures);
        self.outages.extend(other.outages);
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
