use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use mustgather_types::MustGatherLog;

use crate::config::PipelineConfig;
use crate::etcd::{analyze_etcd_log, is_etcd_current_log};
use crate::filter::ErrorPatternMatcher;

/// Run every analyzer that applies to a pod log
pub fn analyze_pod_log(mut log: MustGatherLog, data: &[u8]) -> MustGatherLog {
    let text = String::from_utf8_lossy(data);

    log.error_counters = ErrorPatternMatcher::common().count(&text);

    if is_etcd_current_log(&log) {
        debug!(
            "Must-gather processor - Processing pods logs: {}/{}/{}",
            log.namespace, log.pod, log.container
        );
        log.error_etcd_logs = Some(analyze_etcd_log(&text));
        debug!(
            "Must-gather processor - Done logs processing: {}/{}/{}",
            log.namespace, log.pod, log.container
        );
    }

    log
}

/// Token source refilled with one token per tick, holding at most `burst`
struct TokenBucket {
    tokens: Semaphore,
    burst: usize,
}

impl TokenBucket {
    fn new(burst: usize) -> Self {
        Self {
            tokens: Semaphore::new(0),
            burst: burst.max(1),
        }
    }

    fn refill(&self) {
        if self.tokens.available_permits() < self.burst {
            self.tokens.add_permits(1);
        }
    }

    /// Wait for and consume one token
    async fn take(&self) -> bool {
        match self.tokens.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}

/// Number of submitted logs not yet handed to the aggregate
#[derive(Default)]
struct PendingCounter {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingCounter {
    fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Cloneable handle submitting pod logs to a [`LogPipeline`].
///
/// Submitting never blocks the caller, so it can be used from the
/// synchronous archive walk.
#[derive(Clone)]
pub struct LogSubmitter {
    handle: Handle,
    tokens: Arc<TokenBucket>,
    permits: Arc<Semaphore>,
    results_tx: mpsc::Sender<MustGatherLog>,
    pending: Arc<PendingCounter>,
}

impl LogSubmitter {
    /// Queue a pod log buffer for analysis
    pub fn submit(&self, log: MustGatherLog, data: Vec<u8>) {
        self.pending.increment();

        let tokens = Arc::clone(&self.tokens);
        let permits = Arc::clone(&self.permits);
        let results_tx = self.results_tx.clone();
        let pending = Arc::clone(&self.pending);

        self.handle.spawn(async move {
            let path = log.path.clone();

            // rate first, then concurrency
            if !tokens.take().await {
                error!("must-gather processor/podLogs: rate limiter closed, dropping {}", path);
                pending.decrement();
                return;
            }
            let Ok(permit) = permits.acquire_owned().await else {
                error!("must-gather processor/podLogs: permit pool closed, dropping {}", path);
                pending.decrement();
                return;
            };

            let analyzed = tokio::task::spawn_blocking(move || analyze_pod_log(log, &data)).await;
            drop(permit);

            match analyzed {
                Ok(log) => {
                    if results_tx.send(log).await.is_err() {
                        error!("must-gather processor/podLogs: results queue closed, dropping {}", path);
                        pending.decrement();
                    }
                }
                Err(e) => {
                    error!("must-gather processor/podLogs: analysis of {} failed: {}", path, e);
                    pending.decrement();
                }
            }
        });
    }

    /// Logs submitted and not yet collected
    pub fn pending(&self) -> usize {
        self.pending.get()
    }
}

/// Bounded concurrent analysis of pod log buffers.
///
/// A ticker refills a token source (rate) and a semaphore caps running
/// analyses (concurrency). One drain task appends finished logs that
/// carry findings to the shared list.
pub struct LogPipeline {
    submitter: LogSubmitter,

    /// Finished logs with findings, in completion order
    logs: Arc<Mutex<Vec<MustGatherLog>>>,

    /// Stops the ticker, monitor and drain tasks
    cancel: CancellationToken,

    /// Ticker and monitor task handles
    tasks: Vec<JoinHandle<()>>,

    drain: Option<JoinHandle<()>>,
}

impl LogPipeline {
    /// Start the pipeline tasks. Must be called within a tokio runtime.
    pub fn start(config: &PipelineConfig) -> Self {
        let handle = Handle::current();
        let cancel = CancellationToken::new();
        let concurrency = config.concurrency.max(1);

        let tokens = Arc::new(TokenBucket::new(concurrency));
        let permits = Arc::new(Semaphore::new(concurrency));
        let pending = Arc::new(PendingCounter::default());
        let logs = Arc::new(Mutex::new(Vec::new()));
        let (results_tx, results_rx) = mpsc::channel(config.queue_size.max(1));

        let tasks = vec![
            Self::spawn_ticker(&handle, Arc::clone(&tokens), config.rate_limit_interval(), cancel.clone()),
            Self::spawn_monitor(&handle, Arc::clone(&pending), config.monitor_interval(), cancel.clone()),
        ];
        let drain = Self::spawn_drain(
            &handle,
            results_rx,
            Arc::clone(&logs),
            Arc::clone(&pending),
            cancel.clone(),
        );

        Self {
            submitter: LogSubmitter {
                handle,
                tokens,
                permits,
                results_tx,
                pending,
            },
            logs,
            cancel,
            tasks,
            drain: Some(drain),
        }
    }

    fn spawn_ticker(
        handle: &Handle,
        tokens: Arc<TokenBucket>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        handle.spawn(async move {
            debug!("Leaky bucket ticker - starting");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => tokens.refill(),
                }
            }
            debug!("Leaky bucket ticker - stopped");
        })
    }

    fn spawn_monitor(
        handle: &Handle,
        pending: Arc<PendingCounter>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("Must-gather processor - queue size monitor: {}", pending.get());
                    }
                }
            }
        })
    }

    fn spawn_drain(
        handle: &Handle,
        mut results_rx: mpsc::Receiver<MustGatherLog>,
        logs: Arc<Mutex<Vec<MustGatherLog>>>,
        pending: Arc<PendingCounter>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    received = results_rx.recv() => {
                        let Some(log) = received else { break };
                        if log.processed() {
                            logs.lock().push(log);
                        }
                        pending.decrement();
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// Handle for submitting logs from other tasks or threads
    pub fn submitter(&self) -> LogSubmitter {
        self.submitter.clone()
    }

    /// Queue a pod log buffer for analysis
    pub fn submit(&self, log: MustGatherLog, data: Vec<u8>) {
        self.submitter.submit(log, data);
    }

    pub fn pending(&self) -> usize {
        self.submitter.pending()
    }

    /// Wait for every submitted log, stop the pipeline and return the
    /// logs with findings
    pub async fn finish(mut self) -> Vec<MustGatherLog> {
        debug!("Must-gather processor queued, queue size: {}", self.pending());
        self.submitter.pending.wait_idle().await;

        self.cancel.cancel();
        if let Some(drain) = self.drain.take() {
            if let Err(e) = drain.await {
                error!("must-gather processor: drain task failed: {}", e);
            }
        }
        debug!("Must-gather processor finished, queue size: {}", self.pending());

        std::mem::take(&mut *self.logs.lock())
    }

    /// Stop all tasks without waiting for pending logs
    pub fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            rate_limit_interval_ms: 1,
            concurrency: 4,
            queue_size: 8,
            monitor_interval_secs: 1,
        }
    }

    fn pod_log(namespace: &str, pod: &str, container: &str, file: &str) -> MustGatherLog {
        MustGatherLog::new(
            format!("namespaces/{namespace}/pods/{pod}/{container}/{container}/logs/{file}"),
            namespace.to_string(),
            pod.to_string(),
            container.to_string(),
        )
    }

    #[test]
    fn test_analyze_plain_log() {
        let log = analyze_pod_log(
            pod_log("openshift-apiserver", "apiserver-1", "apiserver", "current.log"),
            b"level=error something\nall good\n",
        );
        let counters = log.error_counters.as_ref().unwrap();
        assert_eq!(counters.get("level=error"), 1);
        assert_eq!(counters.get("error"), 1);
        assert!(log.error_etcd_logs.is_none());
    }

    #[test]
    fn test_analyze_etcd_current_log_only() {
        let line = br#"2023-03-01T15:14:22.192741Z {"level":"warn","ts":"2023-03-01T15:14:22.192Z","msg":"apply request took too long","took":"300ms"}"#;

        let current = analyze_pod_log(pod_log("openshift-etcd", "etcd-master-0", "etcd", "current.log"), line);
        assert!(current.error_etcd_logs.is_some());

        let rotated = analyze_pod_log(
            pod_log("openshift-etcd", "etcd-master-0", "etcd", "previous.log"),
            line,
        );
        assert!(rotated.error_etcd_logs.is_none());

        let other_container = analyze_pod_log(
            pod_log("openshift-etcd", "etcd-master-0", "etcd-metrics", "current.log"),
            line,
        );
        assert!(other_container.error_etcd_logs.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_totals_are_summed() {
        let pipeline = LogPipeline::start(&fast_config());

        let mut expected = 0;
        for i in 0..40u64 {
            let errors = i % 5 + 1;
            expected += errors;
            let data = "level=fatal\n".repeat(errors as usize).into_bytes();
            pipeline.submit(pod_log("ns", &format!("pod-{i}"), "c", "current.log"), data);
        }

        let logs = pipeline.finish().await;
        assert_eq!(logs.len(), 40);

        let total: u64 = logs
            .iter()
            .filter_map(|l| l.error_counters.as_ref())
            .map(|c| c.total())
            .sum();
        assert_eq!(total, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_logs_without_findings_are_dropped() {
        let pipeline = LogPipeline::start(&fast_config());
        pipeline.submit(pod_log("ns", "quiet", "c", "current.log"), b"all good".to_vec());
        pipeline.submit(pod_log("ns", "noisy", "c", "current.log"), b"timed out".to_vec());

        let logs = pipeline.finish().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].pod, "noisy");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_from_blocking_thread() {
        let pipeline = LogPipeline::start(&fast_config());
        let submitter = pipeline.submitter();

        tokio::task::spawn_blocking(move || {
            for i in 0..10 {
                submitter.submit(pod_log("ns", &format!("p{i}"), "c", "current.log"), b"Failed".to_vec());
            }
        })
        .await
        .unwrap();

        let logs = pipeline.finish().await;
        assert_eq!(logs.len(), 10);
    }

    #[tokio::test]
    async fn test_finish_without_submissions() {
        let pipeline = LogPipeline::start(&PipelineConfig::default());
        assert_eq!(pipeline.pending(), 0);
        assert!(pipeline.finish().await.is_empty());
    }
}
