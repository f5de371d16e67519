//! Descriptive statistics over latency samples.
//!
//! Percentiles and quartiles follow the nearest-rank scheme with midpoint
//! interpolation used by the etcd reports this tool feeds.

use mustgather_types::{LatencySummary, Outliers};

/// Compute every statistic of `samples`; all zeros when empty
pub fn summarize(samples: &[f64]) -> LatencySummary {
    if samples.is_empty() {
        return LatencySummary::default();
    }
    let sorted = sorted_copy(samples);

    let sum: f64 = sorted.iter().sum();
    let mean = sum / sorted.len() as f64;

    LatencySummary {
        count: sorted.len() as u64,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        sum,
        mean,
        median: median_sorted(&sorted).unwrap_or_default(),
        stddev: stddev_population(&sorted, mean),
        p90: percentile_sorted(&sorted, 90.0).unwrap_or_default(),
        p99: percentile_sorted(&sorted, 99.0).unwrap_or_default(),
        p999: percentile_sorted(&sorted, 99.9).unwrap_or_default(),
        outliers: quartile_outliers_sorted(&sorted),
    }
}

fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Median of an ascending slice
fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 0 => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
        _ => Some(sorted[n / 2]),
    }
}

/// Percentile of an ascending slice, `percent` in (0, 100].
///
/// The rank `percent/100 * n` selects a sample directly when integral and
/// averages the two neighbours otherwise. Ranks below one fall back to the
/// smallest sample.
fn percentile_sorted(sorted: &[f64], percent: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || percent <= 0.0 || percent > 100.0 {
        return None;
    }
    if percent == 100.0 {
        return Some(sorted[n - 1]);
    }

    let rank = percent / 100.0 * n as f64;
    let index = rank as usize;
    if rank == index as f64 && index >= 1 {
        Some(sorted[index - 1])
    } else if index >= 1 {
        Some((sorted[index - 1] + sorted[index]) / 2.0)
    } else {
        Some(sorted[0])
    }
}

fn stddev_population(samples: &[f64], mean: f64) -> f64 {
    let variance =
        samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

/// First and third quartiles: medians of the lower and upper halves
fn quartiles_sorted(sorted: &[f64]) -> Option<(f64, f64)> {
    let n = sorted.len();
    let (lower_end, upper_start) = if n % 2 == 0 {
        (n / 2, n / 2)
    } else {
        ((n - 1) / 2, (n - 1) / 2 + 1)
    };
    let q1 = median_sorted(&sorted[..lower_end])?;
    let q3 = median_sorted(&sorted[upper_start..])?;
    Some((q1, q3))
}

/// Samples outside the 1.5 IQR (mild) and 3 IQR (extreme) fences
fn quartile_outliers_sorted(sorted: &[f64]) -> Outliers {
    let Some((q1, q3)) = quartiles_sorted(sorted) else {
        return Outliers::default();
    };
    let iqr = q3 - q1;
    let (lower_inner, upper_inner) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let (lower_outer, upper_outer) = (q1 - 3.0 * iqr, q3 + 3.0 * iqr);

    let mut outliers = Outliers::default();
    for &v in sorted {
        if v < lower_outer || v > upper_outer {
            outliers.extreme.push(v);
        } else if v < lower_inner || v > upper_inner {
            outliers.mild.push(v);
        }
    }
    outliers
}

/// Render outliers as `{[mild...] [extreme...]}`
pub fn format_outliers(outliers: &Outliers) -> String {
    let join = |values: &[f64]| {
        values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    format!("{{[{}] [{}]}}", join(&outliers.mild), join(&outliers.extreme))
}
