use std::io::Write;

use mustgather_archive::{ArchiveError, EVENT_FILTER_FILE, MustGather, PipelineConfig};
use xz2::write::XzEncoder;

const PREFIX: &str = "must-gather-opct/quay-io-opct-must-gather-sha256-0123abcd/";

const NETCHECKS: &str = r#"
apiVersion: v1
kind: List
items:
- metadata:
    name: network-check-source-worker-0-to-openshift-apiserver-service-cluster
  spec:
    sourcePod: network-check-source-6c4d6bb6b-qvz7m
    targetEndpoint: 172.30.0.1:443
  status:
    successes:
    - time: "2023-03-01T15:00:00Z"
      reason: TCPConnect
    failures:
    - time: "2023-03-01T14:00:00Z"
      reason: TCPConnectError
      latency: 10s
    outages:
    - start: "2023-03-01T14:00:00Z"
      end: "2023-03-01T14:01:00Z"
"#;

fn slow_line(ts: &str, took: &str) -> String {
    format!(
        r#"2023-03-01T15:14:22.192741Z {{"level":"warn","ts":"{ts}","caller":"etcdserver/util.go:166","msg":"apply request took too long","took":"{took}","expected-duration":"200ms"}}"#
    )
}

fn xz_tarball(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, data.as_slice()).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = XzEncoder::new(Vec::new(), 6);
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

fn must_gather_files() -> Vec<(String, Vec<u8>)> {
    let etcd_0 = [
        slow_line("2023-03-01T15:14:22.192Z", "231.023586ms"),
        slow_line("2023-03-01T15:20:00.000Z", "1.2s"),
        r#"2023-03-01T15:21:00.000000Z {"level":"warn","msg":"rejected connection","remote-addr":"10.0.0.4:42134"}"#.to_string(),
    ]
    .join("\n");
    let etcd_1 = [
        slow_line("2023-03-01T16:01:00.000Z", "640ms"),
        slow_line("2023-03-01T16:02:00.000Z", "150ms"),
    ]
    .join("\n");

    let files = vec![
        (
            "namespaces/openshift-etcd/pods/etcd-master-0/etcd/etcd/logs/current.log",
            etcd_0.into_bytes(),
        ),
        (
            "namespaces/openshift-etcd/pods/etcd-master-1/etcd/etcd/logs/current.log",
            etcd_1.into_bytes(),
        ),
        (
            "namespaces/openshift-apiserver/pods/apiserver-1/openshift-apiserver/openshift-apiserver/logs/current.log",
            b"E0301 'ERROR:' Failed to push image\npanic: runtime error\n".to_vec(),
        ),
        (
            "namespaces/openshift-dns/pods/dns-default-x/dns/dns/logs/current.log",
            b"all quiet\n".to_vec(),
        ),
        ("event-filter.html", b"<html>events</html>".to_vec()),
        ("etcd_info/endpoint_health.json", br#"[{"health":true}]"#.to_vec()),
        (
            "pod_network_connectivity_check/podnetworkconnectivitychecks.yaml",
            NETCHECKS.as_bytes().to_vec(),
        ),
        ("cluster-scoped-resources/core/nodes/master-0.yaml", b"kind: Node".to_vec()),
    ];

    files
        .into_iter()
        .map(|(path, data)| (format!("{PREFIX}{path}"), data))
        .collect()
}

fn must_gather_fixture() -> Vec<u8> {
    xz_tarball(&must_gather_files())
}

/// Bytes xz cannot shrink, so a cut in the compressed stream lands inside them
fn incompressible(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

/// Fixture followed by a large unclassified entry, cut halfway through the
/// compressed stream
fn truncated_fixture() -> Vec<u8> {
    let mut files = must_gather_files();
    files.push((
        format!("{PREFIX}cluster-scoped-resources/core/nodes/filler.yaml"),
        incompressible(64 * 1024),
    ));
    let mut data = xz_tarball(&files);
    data.truncate(data.len() / 2);
    data
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        rate_limit_interval_ms: 1,
        concurrency: 4,
        queue_size: 4,
        monitor_interval_secs: 1,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_process_must_gather() {
    let mut mg = MustGather::new(None, fast_config());
    mg.process(must_gather_fixture()).await.unwrap();

    // the quiet dns log has no findings
    assert_eq!(mg.namespace_errors.len(), 3);

    let apiserver = mg
        .namespace_errors
        .iter()
        .find(|l| l.namespace == "openshift-apiserver")
        .unwrap();
    let counters = apiserver.error_counters.as_ref().unwrap();
    assert_eq!(counters.get("'ERROR:'"), 1);
    assert_eq!(counters.get("Failed to push image"), 1);
    assert_eq!(counters.get("Failed"), 1);
    assert_eq!(counters.get("panic(\\.go)?:"), 1);
    assert_eq!(counters.get("error"), 1);
    assert!(apiserver.error_etcd_logs.is_none());

    let total: u64 = mg
        .namespace_errors
        .iter()
        .filter_map(|l| l.error_counters.as_ref())
        .map(|c| c.total())
        .sum();
    assert_eq!(mg.error_counters.as_ref().unwrap().total(), total);

    let etcd = mg.error_etcd_logs.as_ref().unwrap();
    let etcd_counters = etcd.error_counters.as_ref().unwrap();
    assert_eq!(etcd_counters.get("apply request took too long"), 4);
    assert_eq!(etcd_counters.get("rejected connection"), 1);

    // 150ms is below the banded range
    let all = &etcd.filter_request_slow_all["all"];
    assert_eq!(all.request_count, 3);
    assert_eq!(all.higher_500ms_count, 2);
    assert_eq!(all.buckets["1000-inf"], "1 (33.333%)");
    assert_eq!(all.stat_min, "231.024 (ms)");

    let hours: Vec<&str> = etcd.filter_request_slow_hour.keys().map(String::as_str).collect();
    assert_eq!(hours, vec!["2023-03-01T15", "2023-03-01T16"]);

    assert_eq!(mg.raw_files.len(), 1);
    assert_eq!(mg.raw_files[0].path, "etcd_info/endpoint_health.json");

    assert_eq!(mg.pod_network_checks.checks.len(), 1);
    assert_eq!(mg.pod_network_checks.total_success, 1);
    assert_eq!(mg.pod_network_checks.total_failures, 1);
    assert_eq!(mg.pod_network_checks.total_outages, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_saves_event_filter() {
    let dir = tempfile::tempdir().unwrap();
    let save_dir = dir.path().join("must-gather");

    let mut mg = MustGather::new(Some(save_dir.clone()), fast_config());
    mg.process(must_gather_fixture()).await.unwrap();

    let saved = std::fs::read_to_string(save_dir.join(EVENT_FILTER_FILE)).unwrap();
    assert_eq!(saved, "<html>events</html>");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serialized_output() {
    let mut mg = MustGather::new(None, fast_config());
    mg.process(must_gather_fixture()).await.unwrap();

    let json = serde_json::to_value(&mg).unwrap();
    assert!(json["ErrorCounters"]["total"].as_u64().unwrap() > 0);
    assert_eq!(
        json["ErrorEtcdLogs"]["FilterRequestSlowAll"]["all"]["RequestCount"],
        3
    );
    assert!(json["ErrorEtcdLogs"].get("Buffer").is_none());
    assert_eq!(json["PodNetworkChecks"]["TotalFailures"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_archive_keeps_partial_results() {
    let data = truncated_fixture();
    let mut mg = MustGather::new(None, fast_config());
    let err = mg.process(data).await.unwrap_err();
    assert!(matches!(err, ArchiveError::Io(_)), "unexpected error: {err}");

    // every pod log precedes the cut
    assert_eq!(mg.namespace_errors.len(), 3);
    let counters = mg.error_counters.as_ref().unwrap();
    assert_eq!(counters.get("Failed to push image"), 1);
    let total: u64 = mg
        .namespace_errors
        .iter()
        .filter_map(|l| l.error_counters.as_ref())
        .map(|c| c.total())
        .sum();
    assert_eq!(counters.total(), total);

    let etcd = mg.error_etcd_logs.as_ref().unwrap();
    assert_eq!(etcd.filter_request_slow_all["all"].request_count, 3);
    assert_eq!(mg.raw_files.len(), 1);
    assert_eq!(mg.pod_network_checks.total_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_stream_footer_is_not_read() {
    let mut data = must_gather_fixture();
    // the tar end marker is reached before the xz footer
    data.truncate(data.len() - 4);

    let mut mg = MustGather::new(None, fast_config());
    mg.process(data).await.unwrap();
    assert_eq!(mg.namespace_errors.len(), 3);
    assert!(mg.error_etcd_logs.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_load_truncated_archive_keeps_partial_results() {
    let data = truncated_fixture();
    let mg = MustGather::load_or_empty(Some(data), None, fast_config()).await;
    assert!(!mg.is_empty());
    assert_eq!(mg.namespace_errors.len(), 3);
}

#[tokio::test]
async fn test_absent_must_gather_is_empty() {
    let mg = MustGather::load_or_empty(None, None, PipelineConfig::default()).await;
    assert!(mg.is_empty());
    assert!(mg.error_counters.is_none());
}
