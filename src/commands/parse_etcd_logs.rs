use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use mustgather_logs::{
    BUCKET_1000MS_INF, BucketFilterStat, ErrorCounter, ErrorPatternMatcher, FINE_BUCKETS, GroupBy,
    SlowApplyFilter,
};

/// etcd member logs inside an extracted must-gather
static ETCD_LOG_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/namespaces/openshift-etcd/pods/[^/]+/etcd/etcd/logs/[^/]+\.log")
        .expect("valid etcd log pattern")
});

const COLUMN_WIDTH: usize = 13;
const PATTERN_WIDTH: usize = 60;

/// Slow request filter plus etcd error counters over a stream of lines
struct EtcdLogParser {
    filter: SlowApplyFilter,
    counters: Option<ErrorCounter>,
    count_errors: bool,
}

impl EtcdLogParser {
    fn new(group_by: GroupBy, count_errors: bool) -> Self {
        Self {
            filter: SlowApplyFilter::new(group_by),
            counters: None,
            count_errors,
        }
    }

    fn process_line(&mut self, line: &str) {
        self.filter.process_line(line);
        if !self.count_errors {
            return;
        }
        if let Some(found) = ErrorPatternMatcher::etcd().count(line) {
            self.counters.get_or_insert_with(ErrorCounter::new).merge_from(&found);
        }
    }

    fn process_text(&mut self, text: &str) {
        for line in text.lines() {
            self.process_line(line);
        }
    }
}

/// Run `parse-etcd-logs` over a directory, or stdin when none is given
pub fn run(dir: Option<&Path>, group_by: GroupBy, skip_error_counter: bool) -> Result<()> {
    let mut parser = EtcdLogParser::new(group_by, !skip_error_counter);

    match dir {
        Some(dir) => {
            info!("Processing logs from directory {}", dir.display());
            let mut files = Vec::new();
            collect_etcd_logs(dir, &mut files)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
            files.sort();

            for path in files {
                debug!("Processing etcd log file: {}", path.display());
                let data = fs::read(&path)
                    .with_context(|| format!("Failed to read log file: {}", path.display()))?;
                parser.process_text(&String::from_utf8_lossy(&data));
                debug!("etcd log processed: {}", path.display());
            }
        }
        None => {
            info!("Processing logs from stdin");
            for line in io::stdin().lock().lines() {
                let line = line.context("Failed to read stdin")?;
                parser.process_line(&line);
            }
        }
    }

    let mut stdout = io::stdout().lock();
    render(&parser, &mut stdout).context("Failed to write report")?;
    Ok(())
}

fn collect_etcd_logs(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_etcd_logs(&path, files)?;
        } else if ETCD_LOG_PATH.is_match(&path.to_string_lossy()) {
            files.push(path);
        }
    }
    Ok(())
}

// ============================================================================
// Report
// ============================================================================

fn render(parser: &EtcdLogParser, out: &mut impl Write) -> io::Result<()> {
    let stat = parser.filter.get_stat(0);

    writeln!(out, "= Filter Name: {} =", SlowApplyFilter::NAME)?;
    writeln!(out, "== Group by: {} ==", parser.filter.group_by().as_str())?;

    let mut summary = vec![row(["ID", "COUNT", ">=500ms", ">=1s", "Max(ms)"])];
    let mut buckets = vec![{
        let mut header = vec!["ID".to_string(), "COUNT".to_string()];
        header.extend(FINE_BUCKETS[..FINE_BUCKETS.len() - 2].iter().map(|b| b.to_string()));
        header.push(">=1s".to_string());
        header
    }];
    let mut timers = vec![row([
        "ID", "COUNT", "MIN", "AVG", "MAX", "P99", "P99.9", "P90", "StdDev",
    ])];

    // BTreeMap keeps the groups sorted
    for (key, s) in &stat {
        summary.push(vec![
            key.clone(),
            s.request_count.to_string(),
            s.higher_500ms.clone(),
            bucket(s, BUCKET_1000MS_INF),
            s.stat_max.clone(),
        ]);

        let mut bucket_row = vec![key.clone(), s.request_count.to_string()];
        bucket_row.extend(
            FINE_BUCKETS[..FINE_BUCKETS.len() - 1]
                .iter()
                .map(|band| bucket(s, band)),
        );
        buckets.push(bucket_row);

        timers.push(vec![
            key.clone(),
            s.stat_count.clone(),
            s.stat_min.clone(),
            s.stat_mean.clone(),
            s.stat_max.clone(),
            s.stat_perc99.clone(),
            s.stat_perc999.clone(),
            s.stat_perc90.clone(),
            s.stat_stddev.clone(),
        ]);
    }

    writeln!(out, "\n=== Summary ===")?;
    write_table(out, &summary)?;

    writeln!(out, "\n=== Buckets (ms) ===")?;
    write_table(out, &buckets)?;

    writeln!(out, "\n=== Timers ===")?;
    write_table(out, &timers)?;

    if parser.count_errors {
        writeln!(out, "\n=== Log error counters ===")?;
        writeln!(out, "{:<width$} COUNTER", "ERROR PATTERN", width = PATTERN_WIDTH)?;
        if let Some(counters) = &parser.counters {
            for (pattern, count) in counters.iter() {
                writeln!(out, "{:<width$} : {}", pattern, count, width = PATTERN_WIDTH)?;
            }
        }
    }
    Ok(())
}

fn row<const N: usize>(cols: [&str; N]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn bucket(stat: &BucketFilterStat, band: &str) -> String {
    stat.buckets.get(band).cloned().unwrap_or_default()
}

fn write_table(out: &mut impl Write, rows: &[Vec<String>]) -> io::Result<()> {
    for cols in rows {
        let line = cols
            .iter()
            .map(|c| format!("{:<width$}", c, width = COLUMN_WIDTH))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}
