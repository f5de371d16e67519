use regex::Regex;
use std::sync::LazyLock;

use mustgather_types::{ErrorCounter, TOTAL_KEY};

/// Generic error signatures searched in every pod log
pub const COMMON_ERROR_PATTERNS: &[&str] = &[
    "Failed to push image",
    "Failed",
    "timed out",
    "'ERROR:'",
    r"ERRO\[",
    "^error:",
    r"(^FAIL|FAIL: |Failure \[)\b",
    r"panic(\.go)?:",
    r#""level":"error""#,
    "level=error",
    r#"level":"fatal""#,
    "level=fatal",
    "│ Error:",
    "client connection lost",
];

/// etcd-specific signatures searched in the etcd member's log
pub const ETCD_ERROR_PATTERNS: &[&str] = &[
    "rejected connection",
    "waiting for ReadIndex response took too long, retrying",
    "failed to find remote peer in cluster",
    "dropped Raft message since sending buffer is full (overloaded network)",
    "request stats",
    "apply request took too long",
    "failed to lock file",
    "leader failed to send out heartbeat on time",
    "leader is overloaded likely from slow disk",
    "rejected stream from remote peer because it was removed",
    "peer became inactive (message send to peer failed)",
    "lost TCP streaming connection with remote peer",
    "failed to reach the peer URL",
    "prober detected unhealthy status",
];

/// Pattern appended to every pattern list
pub const IMPLICIT_ERROR_PATTERN: &str = "error";

static COMMON_MATCHER: LazyLock<ErrorPatternMatcher> = LazyLock::new(|| {
    ErrorPatternMatcher::new(COMMON_ERROR_PATTERNS).expect("common error patterns are valid regexes")
});

static ETCD_MATCHER: LazyLock<ErrorPatternMatcher> = LazyLock::new(|| {
    ErrorPatternMatcher::new(ETCD_ERROR_PATTERNS).expect("etcd error patterns are valid regexes")
});

/// Ordered list of compiled error patterns
#[derive(Clone)]
pub struct ErrorPatternMatcher {
    /// Original pattern string and its compiled form
    patterns: Vec<(String, Regex)>,
}

impl ErrorPatternMatcher {
    /// Compile `patterns` followed by the implicit `error` pattern.
    ///
    /// The implicit pattern is appended even when `patterns` already
    /// contains it, so such a pattern is counted twice under one key.
    pub fn new(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .copied()
            .chain(std::iter::once(IMPLICIT_ERROR_PATTERN))
            .map(|p| Ok((p.to_string(), Regex::new(p)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { patterns })
    }

    /// Matcher for [`COMMON_ERROR_PATTERNS`]
    pub fn common() -> &'static Self {
        &COMMON_MATCHER
    }

    /// Matcher for [`ETCD_ERROR_PATTERNS`]
    pub fn etcd() -> &'static Self {
        &ETCD_MATCHER
    }

    /// Count non-overlapping matches of each pattern in `text`.
    ///
    /// Returns `None` when no pattern matched at all.
    pub fn count(&self, text: &str) -> Option<ErrorCounter> {
        let mut counter = ErrorCounter::new();
        let mut total = 0;

        for (pattern, re) in &self.patterns {
            let matches = re.find_iter(text).count() as u64;
            if matches > 0 {
                counter.add(pattern, matches);
                total += matches;
            }
        }

        if total == 0 {
            return None;
        }
        counter.add(TOTAL_KEY, total);
        Some(counter)
    }

    /// Pattern strings in match order, including the implicit one
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }
}

impl std::fmt::Debug for ErrorPatternMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorPatternMatcher")
            .field("patterns", &self.patterns().collect::<Vec<_>>())
            .finish()
    }
}
