use std::collections::BTreeMap;

use mustgather_types::BucketFilterStat;

use crate::stats::{format_outliers, summarize};

/// Bucket holding every sample of a group
pub const BUCKET_ALL: &str = "all";

pub const BUCKET_200MS: &str = "200-300";
pub const BUCKET_300MS: &str = "300-400";
pub const BUCKET_400MS: &str = "400-500";
pub const BUCKET_500MS: &str = "500-600";
pub const BUCKET_600MS: &str = "600-700";
pub const BUCKET_700MS: &str = "700-800";
pub const BUCKET_800MS: &str = "800-900";
pub const BUCKET_900MS: &str = "900-999";
pub const BUCKET_1000MS_INF: &str = "1000-inf";
pub const BUCKET_500MS_INF: &str = "500-inf";

/// Fine-grained (1s) histogram bands, `all` last
pub const FINE_BUCKETS: [&str; 10] = [
    BUCKET_200MS,
    BUCKET_300MS,
    BUCKET_400MS,
    BUCKET_500MS,
    BUCKET_600MS,
    BUCKET_700MS,
    BUCKET_800MS,
    BUCKET_900MS,
    BUCKET_1000MS_INF,
    BUCKET_ALL,
];

/// Coarse (500ms) histogram bands, `all` last
pub const COARSE_BUCKETS: [&str; 5] = [
    BUCKET_200MS,
    BUCKET_300MS,
    BUCKET_400MS,
    BUCKET_500MS_INF,
    BUCKET_ALL,
];

/// Lower bound of the banded range; etcd only reports requests above 200ms
pub const MIN_SLOW_REQUEST_MS: f64 = 200.0;

/// Band of the fine histogram for `ms`, `None` below 200ms or for NaN
pub fn fine_band(ms: f64) -> Option<&'static str> {
    if ms.is_nan() || ms < MIN_SLOW_REQUEST_MS {
        return None;
    }
    let band = match ms {
        v if v < 300.0 => BUCKET_200MS,
        v if v < 400.0 => BUCKET_300MS,
        v if v < 500.0 => BUCKET_400MS,
        v if v < 600.0 => BUCKET_500MS,
        v if v < 700.0 => BUCKET_600MS,
        v if v < 800.0 => BUCKET_700MS,
        v if v < 900.0 => BUCKET_800MS,
        v if v < 1000.0 => BUCKET_900MS,
        _ => BUCKET_1000MS_INF,
    };
    Some(band)
}

/// Band of the coarse histogram for `ms`, `None` below 200ms or for NaN
pub fn coarse_band(ms: f64) -> Option<&'static str> {
    match fine_band(ms)? {
        b @ (BUCKET_200MS | BUCKET_300MS | BUCKET_400MS) => Some(b),
        _ => Some(BUCKET_500MS_INF),
    }
}

/// Raw samples per band name
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Buckets(BTreeMap<&'static str, Vec<f64>>);

impl Buckets {
    /// Create buckets with every band present and empty
    pub fn new(bands: &[&'static str]) -> Self {
        Self(bands.iter().map(|b| (*b, Vec::new())).collect())
    }

    fn push(&mut self, band: &'static str, ms: f64) {
        self.0.entry(band).or_default().push(ms);
    }

    /// Samples of a band (empty when unknown)
    pub fn samples(&self, band: &str) -> &[f64] {
        self.0.get(band).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, band: &str) -> usize {
        self.samples(band).len()
    }
}

/// Fine and coarse histograms of one aggregation key
#[derive(Clone, Debug, PartialEq)]
pub struct BucketGroup {
    pub fine: Buckets,
    pub coarse: Buckets,
}

impl Default for BucketGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketGroup {
    pub fn new() -> Self {
        Self {
            fine: Buckets::new(&FINE_BUCKETS),
            coarse: Buckets::new(&COARSE_BUCKETS),
        }
    }

    /// Record a sample in one band of each histogram and in `all`.
    ///
    /// Returns false, recording nothing, for samples under 200ms.
    pub fn insert(&mut self, ms: f64) -> bool {
        let (Some(fine), Some(coarse)) = (fine_band(ms), coarse_band(ms)) else {
            return false;
        };
        self.fine.push(fine, ms);
        self.fine.push(BUCKET_ALL, ms);
        self.coarse.push(coarse, ms);
        self.coarse.push(BUCKET_ALL, ms);
        true
    }

    /// Number of samples in the group
    pub fn len(&self) -> usize {
        self.fine.count(BUCKET_ALL)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute the statistics snapshot of this group
    pub fn stat(&self) -> BucketFilterStat {
        let all = self.fine.samples(BUCKET_ALL);
        let total = all.len();

        let higher = self.coarse.count(BUCKET_500MS_INF);
        let higher_percent = percent(higher, self.coarse.count(BUCKET_ALL));

        let buckets = FINE_BUCKETS
            .iter()
            .map(|band| {
                let count = self.fine.count(band);
                let value = if *band == BUCKET_ALL {
                    count.to_string()
                } else {
                    format!("{} ({:.3}%)", count, percent(count, total))
                };
                (band.to_string(), value)
            })
            .collect();

        let summary = summarize(all);

        BucketFilterStat {
            request_count: total as u64,
            higher_500ms: format!("{} ({:.3}%)", higher, higher_percent),
            higher_500ms_count: higher as u64,
            higher_500ms_percent: higher_percent,
            buckets,
            stat_count: total.to_string(),
            stat_min: format_ms(summary.min),
            stat_median: format_ms(summary.median),
            stat_mean: format_ms(summary.mean),
            stat_max: format_ms(summary.max),
            stat_sum: format_ms(summary.sum),
            stat_stddev: format!("{:.3}", summary.stddev),
            stat_perc90: format_ms(summary.p90),
            stat_perc99: format_ms(summary.p99),
            stat_perc999: format_ms(summary.p999),
            stat_outliers: format_outliers(&summary.outliers),
            summary,
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

fn format_ms(v: f64) -> String {
    format!("{:.3} (ms)", v)
}
