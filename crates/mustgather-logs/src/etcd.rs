use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, error};

use mustgather_types::{BucketFilterStat, ErrorEtcdLogs, MustGatherLog};

use crate::buckets::{BUCKET_ALL, BucketGroup};
use crate::filter::ErrorPatternMatcher;

/// Namespace of the etcd static pods
pub const ETCD_NAMESPACE: &str = "openshift-etcd";

/// Container running the etcd member
pub const ETCD_CONTAINER: &str = "etcd";

/// Suffix of the non-rotated container log
pub const CURRENT_LOG_SUFFIX: &str = "current.log";

/// Marker of the lines carrying request latency
pub const SLOW_APPLY_MARKER: &str = "apply request took too long";

/// Hour windows kept in the per-log statistics
pub const PER_LOG_HOUR_WINDOWS: usize = 3;

/// Hour windows kept in the must-gather wide statistics
pub const AGGREGATE_HOUR_WINDOWS: usize = 4;

// kubelet prefixes every container log line with its own timestamp
static LINE_TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+-\d+-\d+T\d+:\d+:\d+\.\d+Z ").expect("timestamp prefix regex is valid")
});

/// Whether the log is the current log of an etcd member container
pub fn is_etcd_current_log(log: &MustGatherLog) -> bool {
    log.namespace == ETCD_NAMESPACE
        && log.container == ETCD_CONTAINER
        && log.path.ends_with(CURRENT_LOG_SUFFIX)
}

/// How samples are grouped into aggregation keys
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupBy {
    /// `YYYY-MM-DDTHH`
    Hour,
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDTHH:MM`
    Minute,
    /// One fixed key for every sample (typically `all`)
    Fixed(String),
}

impl GroupBy {
    /// Single global group keyed `all`
    pub fn all() -> Self {
        Self::Fixed(BUCKET_ALL.to_string())
    }

    /// Aggregation key of a sample timestamp.
    ///
    /// Timestamps that fail to parse fall into the `all` key.
    pub fn key_for(&self, ts: &str) -> String {
        let format = match self {
            Self::Hour => "%Y-%m-%dT%H",
            Self::Day => "%Y-%m-%d",
            Self::Minute => "%Y-%m-%dT%H:%M",
            Self::Fixed(key) => return key.clone(),
        };
        match DateTime::parse_from_rfc3339(ts) {
            Ok(ts) => ts.with_timezone(&Utc).format(format).to_string(),
            Err(e) => {
                debug!("etcd log parser - unable to parse timestamp {:?}: {}", ts, e);
                BUCKET_ALL.to_string()
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Minute => "minute",
            Self::Fixed(key) => key,
        }
    }
}

impl From<&str> for GroupBy {
    fn from(s: &str) -> Self {
        match s {
            "hour" => Self::Hour,
            "day" => Self::Day,
            "minute" | "min" => Self::Minute,
            other => Self::Fixed(other.to_string()),
        }
    }
}

/// Fields of an etcd JSON log record used by the filter
#[derive(Debug, Deserialize)]
struct SlowApplyRecord {
    #[serde(default)]
    took: String,
    #[serde(default)]
    ts: String,
}

/// One latency measurement taken from a slow apply line
#[derive(Clone, Debug, PartialEq)]
pub struct SlowApplySample {
    pub took_ms: f64,
    pub ts: String,
}

/// Result of inspecting one log line
#[derive(Clone, Debug, PartialEq)]
pub enum LineOutcome {
    /// Not a slow apply line
    Ignored,
    /// A slow apply line whose payload could not be used
    Unparsable,
    Sample(SlowApplySample),
}

/// Parse a Go duration string with `ms` or `s` unit into milliseconds.
/// Only finite values are accepted.
pub fn parse_took_ms(took: &str) -> Option<f64> {
    let ms = if let Some(ms) = took.strip_suffix("ms") {
        ms.parse::<f64>().ok()
    } else if let Some(secs) = took.strip_suffix('s') {
        secs.parse::<f64>().ok().map(|s| s * 1000.0)
    } else {
        None
    };
    ms.filter(|ms| ms.is_finite())
}

/// Inspect one etcd log line for a slow apply measurement
pub fn inspect_line(line: &str) -> LineOutcome {
    if !line.contains(SLOW_APPLY_MARKER) {
        return LineOutcome::Ignored;
    }

    let payload = match LINE_TIMESTAMP_PREFIX.find(line) {
        Some(prefix) => &line[prefix.end()..],
        None => line,
    };

    let record: SlowApplyRecord = match serde_json::from_str(payload.trim()) {
        Ok(record) => record,
        Err(e) => {
            error!("etcd log parser - couldn't parse json: {}", e);
            return LineOutcome::Unparsable;
        }
    };

    match parse_took_ms(&record.took) {
        Some(took_ms) => LineOutcome::Sample(SlowApplySample {
            took_ms,
            ts: record.ts,
        }),
        None => {
            error!("etcd log parser - no bucket for took value {:?}", record.took);
            LineOutcome::Unparsable
        }
    }
}

/// Groups "apply request took too long" latencies into time-windowed
/// histograms
#[derive(Clone, Debug)]
pub struct SlowApplyFilter {
    group_by: GroupBy,
    groups: BTreeMap<String, BucketGroup>,
}

impl SlowApplyFilter {
    pub const NAME: &'static str = "ApplyTookTooLong";

    pub fn new(group_by: impl Into<GroupBy>) -> Self {
        Self {
            group_by: group_by.into(),
            groups: BTreeMap::new(),
        }
    }

    pub fn group_by(&self) -> &GroupBy {
        &self.group_by
    }

    pub fn groups(&self) -> &BTreeMap<String, BucketGroup> {
        &self.groups
    }

    /// Feed one log line; returns whether it carried the slow apply marker
    pub fn process_line(&mut self, line: &str) -> bool {
        match inspect_line(line) {
            LineOutcome::Ignored => false,
            LineOutcome::Unparsable => true,
            LineOutcome::Sample(sample) => {
                self.record(&sample);
                true
            }
        }
    }

    /// Add a sample to the group of its timestamp
    pub fn record(&mut self, sample: &SlowApplySample) {
        let key = self.group_by.key_for(&sample.ts);
        let group = self.groups.entry(key).or_default();
        if !group.insert(sample.took_ms) {
            debug!(
                "etcd log parser - got request faster than 200ms (should not happen): {}",
                sample.took_ms
            );
        }
    }

    /// Statistics of the `latest` most recent keys; 0 keeps every key.
    ///
    /// Keys sort chronologically for the hour, day and minute formats.
    /// Keys without any banded sample are left out.
    pub fn get_stat(&self, latest: usize) -> BTreeMap<String, BucketFilterStat> {
        let populated: Vec<_> = self.groups.iter().filter(|(_, g)| !g.is_empty()).collect();
        let skip = match latest {
            0 => 0,
            n => populated.len().saturating_sub(n),
        };

        populated
            .into_iter()
            .skip(skip)
            .map(|(key, group)| (key.clone(), group.stat()))
            .collect()
    }
}

/// Run the slow apply filters over `lines`, returning the hourly view
/// (last `hour_windows` hours) and the global view
pub fn slow_request_stats<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    hour_windows: usize,
) -> (BTreeMap<String, BucketFilterStat>, BTreeMap<String, BucketFilterStat>) {
    let mut by_hour = SlowApplyFilter::new(GroupBy::Hour);
    let mut all = SlowApplyFilter::new(GroupBy::all());

    for line in lines {
        if let LineOutcome::Sample(sample) = inspect_line(line) {
            by_hour.record(&sample);
            all.record(&sample);
        }
    }

    (by_hour.get_stat(hour_windows), all.get_stat(1))
}

/// Analyze the text of an etcd member's current log
pub fn analyze_etcd_log(text: &str) -> ErrorEtcdLogs {
    let buffer: Vec<String> = text
        .lines()
        .filter(|line| line.contains(SLOW_APPLY_MARKER))
        .map(str::to_string)
        .collect();

    let (filter_request_slow_hour, filter_request_slow_all) =
        slow_request_stats(buffer.iter().map(String::as_str), PER_LOG_HOUR_WINDOWS);

    ErrorEtcdLogs {
        error_counters: ErrorPatternMatcher::etcd().count(text),
        filter_request_slow_all,
        filter_request_slow_hour,
        buffer,
    }
}
