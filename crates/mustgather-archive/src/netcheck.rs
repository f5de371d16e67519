//! PodNetworkConnectivityCheck list parsing.
//!
//! The collector dumps `podnetworkconnectivitychecks.yaml` as a plain
//! `List`. Every field is optional in the schema below; items missing
//! metadata, spec or status are logged and skipped.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use tracing::{debug, error};

use mustgather_types::{NetworkCheckFailure, NetworkOutage, PodNetworkCheck, PodNetworkChecks};

use crate::error::Result;

#[derive(Debug, Default, Deserialize)]
struct CheckList {
    #[serde(default)]
    items: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct ConnectivityCheck {
    metadata: Option<ObjectMeta>,
    spec: Option<CheckSpec>,
    status: Option<CheckStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckSpec {
    source_pod: Option<String>,
    target_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckStatus {
    successes: Option<Vec<serde_yaml::Value>>,
    failures: Option<Vec<ProbeEntry>>,
    outages: Option<Vec<OutageEntry>>,
}

/// One probe log entry
#[derive(Debug, Deserialize)]
struct ProbeEntry {
    time: Option<String>,
    reason: Option<String>,
    latency: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutageEntry {
    start: Option<String>,
    end: Option<String>,
    message: Option<String>,
}

/// Parse a check list and merge every valid item into `checks`.
///
/// Returns the number of checks inserted. Only a document that is not
/// YAML at all is an error.
pub fn parse_pod_network_checks(data: &[u8], checks: &mut PodNetworkChecks) -> Result<usize> {
    if data.iter().all(u8::is_ascii_whitespace) {
        debug!("empty pod network check document");
        return Ok(0);
    }
    let list: Option<CheckList> = serde_yaml::from_slice(data)?;
    let Some(list) = list else {
        debug!("empty pod network check document");
        return Ok(0);
    };

    let mut inserted = 0;
    for value in list.items {
        let item: ConnectivityCheck = match serde_yaml::from_value(value) {
            Ok(item) => item,
            Err(e) => {
                error!("unable to decode pod network check: {}", e);
                continue;
            }
        };
        if insert_item(item, checks) {
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn insert_item(item: ConnectivityCheck, checks: &mut PodNetworkChecks) -> bool {
    let Some(metadata) = item.metadata else {
        error!("unable to retrieve pod network check metadata");
        return false;
    };
    let Some(name) = metadata.name else {
        error!("unable to retrieve pod network check name");
        return false;
    };
    let Some(spec) = item.spec else {
        error!("unable to retrieve pod network check spec: {}", name);
        return false;
    };
    let Some(status) = item.status else {
        error!("unable to retrieve pod network check status: {}", name);
        return false;
    };

    let successes = status.successes.unwrap_or_default();
    let probe_failures = status.failures.unwrap_or_default();
    let outage_entries = status.outages.unwrap_or_default();

    let check = PodNetworkCheck {
        name: name.clone(),
        spec_source: spec.source_pod.unwrap_or_default(),
        spec_target: spec.target_endpoint.unwrap_or_default(),
        total_failures: probe_failures.len() as u64,
        total_outages: outage_entries.len() as u64,
        total_success: successes.len() as u64,
    };

    // entries without a timestamp still count in the totals
    let failures = probe_failures
        .into_iter()
        .filter_map(|f| {
            Some(NetworkCheckFailure {
                name: name.clone(),
                time: f.time?,
                reason: f.reason.unwrap_or_default(),
                latency: f.latency.unwrap_or_default(),
                message: f.message.unwrap_or_default(),
            })
        })
        .collect();

    let outages = outage_entries
        .into_iter()
        .filter_map(|o| {
            Some(NetworkOutage {
                name: name.clone(),
                start: o.start?,
                end: o.end.unwrap_or_default(),
                message: o.message.unwrap_or_default(),
            })
        })
        .collect();

    checks.insert_check(check, failures, outages);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKS_YAML: &str = r#"
apiVersion: v1
kind: List
items:
- apiVersion: controlplane.operator.openshift.io/v1alpha1
  kind: PodNetworkConnectivityCheck
  metadata:
    name: network-check-source-worker-0-to-kubernetes-apiserver-endpoint-master-0
    namespace: openshift-network-diagnostics
  spec:
    sourcePod: network-check-source-7d9b4b9c5-x2x4z
    targetEndpoint: 10.0.0.3:6443
  status:
    successes:
    - latency: 2.5ms
      message: "kubernetes-apiserver-endpoint-master-0: tcp connection to 10.0.0.3:6443 succeeded"
      reason: TCPConnect
      success: true
      time: "2023-03-01T15:10:00Z"
    - latency: 1.9ms
      reason: TCPConnect
      success: true
      time: "2023-03-01T15:11:00Z"
    failures:
    - latency: 10s
      message: "kubernetes-apiserver-endpoint-master-0: failed to establish a TCP connection"
      reason: TCPConnectError
      success: false
      time: "2023-03-01T14:02:00Z"
    - reason: TCPConnectError
      success: false
    outages:
    - start: "2023-03-01T14:02:00Z"
      end: "2023-03-01T14:03:00Z"
      message: Connectivity restored after 1m0s
- metadata:
    name: missing-status
  spec:
    sourcePod: a
    targetEndpoint: b
- spec:
    sourcePod: a
    targetEndpoint: b
  status: {}
"#;

    #[test]
    fn test_parse_checks() {
        let mut checks = PodNetworkChecks::default();
        let inserted = parse_pod_network_checks(CHECKS_YAML.as_bytes(), &mut checks).unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(checks.checks.len(), 1);
        assert_eq!(checks.total_success, 2);
        assert_eq!(checks.total_failures, 2);
        assert_eq!(checks.total_outages, 1);

        let check = &checks.checks[0];
        assert_eq!(check.spec_source, "network-check-source-7d9b4b9c5-x2x4z");
        assert_eq!(check.spec_target, "10.0.0.3:6443");

        // the failure without a time is counted but not listed
        assert_eq!(checks.failures.len(), 1);
        assert_eq!(checks.failures[0].reason, "TCPConnectError");
        assert_eq!(checks.failures[0].latency, "10s");
        assert_eq!(checks.failures[0].name, check.name);

        assert_eq!(checks.outages.len(), 1);
        assert_eq!(checks.outages[0].end, "2023-03-01T14:03:00Z");
    }

    #[test]
    fn test_parse_accumulates() {
        let mut checks = PodNetworkChecks::default();
        parse_pod_network_checks(CHECKS_YAML.as_bytes(), &mut checks).unwrap();
        parse_pod_network_checks(CHECKS_YAML.as_bytes(), &mut checks).unwrap();
        assert_eq!(checks.checks.len(), 2);
        assert_eq!(checks.total_success, 4);
    }

    #[test]
    fn test_parse_empty_list() {
        let mut checks = PodNetworkChecks::default();
        assert_eq!(parse_pod_network_checks(b"items: []", &mut checks).unwrap(), 0);
        assert_eq!(parse_pod_network_checks(b"", &mut checks).unwrap(), 0);
        assert!(checks.is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let mut checks = PodNetworkChecks::default();
        assert!(parse_pod_network_checks(b"items: [unclosed", &mut checks).is_err());
    }
}
