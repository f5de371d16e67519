use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// Entry patterns
// ============================================================================

const POD_LOG_PATTERN: &str = r"/namespaces/[^/]+/pods/[^/]+/[^/]+/.*\.log";
const EVENT_FILTER_PATTERN: &str = r"/event-filter\.html";
const RAW_FILE_PATTERN: &str = r"/etcd_info/.+\.json";
const POD_NETWORK_CHECK_PATTERN: &str =
    r"/pod_network_connectivity_check/podnetworkconnectivitychecks\.yaml";

/// Directory prefix written by the collector plugin, followed by the image directory
const MUST_GATHER_PREFIX_PATTERN: &str = r"must-gather-opct/([A-Za-z0-9]+(-[A-Za-z0-9]+)+/)";

/// Patterns in the order they are tried; the first match wins
static ENTRY_PATTERNS: LazyLock<Vec<(EntryKind, Regex)>> = LazyLock::new(|| {
    [
        (EntryKind::PodLog, POD_LOG_PATTERN),
        (EntryKind::EventFilter, EVENT_FILTER_PATTERN),
        (EntryKind::RawFile, RAW_FILE_PATTERN),
        (EntryKind::PodNetworkCheck, POD_NETWORK_CHECK_PATTERN),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid entry pattern")))
    .collect()
});

static MUST_GATHER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MUST_GATHER_PREFIX_PATTERN).expect("valid prefix pattern"));

// ============================================================================
// Classification
// ============================================================================

/// Kind of archive entry worth extracting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Container log under `namespaces/<ns>/pods/<pod>/<container>/`
    PodLog,
    /// Event filter HTML export
    EventFilter,
    /// JSON artifact kept verbatim
    RawFile,
    /// PodNetworkConnectivityCheck list
    PodNetworkCheck,
}

/// Classify an archive entry by its path. Matching is case-sensitive and
/// anchored on `/`, so relative tar names are rooted first.
pub fn classify(path: &str) -> Option<EntryKind> {
    let rooted;
    let path = if path.starts_with('/') {
        path
    } else {
        rooted = format!("/{path}");
        rooted.as_str()
    };

    ENTRY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(path))
        .map(|(kind, _)| *kind)
}

/// Strip the `must-gather-opct/<image-dir>/` prefix from an entry path.
/// Paths without exactly one such prefix are returned unchanged.
pub fn normalize_relative_path(path: &str) -> String {
    let parts: Vec<&str> = MUST_GATHER_PREFIX.split(path).collect();
    match parts.as_slice() {
        [_, relative] => relative.to_string(),
        _ => path.to_string(),
    }
}

/// Namespace, pod and container of a pod log path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodLogLocation {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

/// Locate a pod log from the segments following `namespaces/`:
/// `<ns>/pods/<pod>/<container>/...`
pub fn pod_log_location(path: &str) -> Option<PodLogLocation> {
    let (_, rest) = path.split_once("namespaces/")?;
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.len() < 4 {
        return None;
    }
    Some(PodLogLocation {
        namespace: segments[0].to_string(),
        pod: segments[2].to_string(),
        container: segments[3].to_string(),
    })
}
