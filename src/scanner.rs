pub mod probe;
mod report;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::ScanError;
use crate::utils::PortRange;
pub use probe::{ProbeOutcome, Prober, Target, TcpProber};
pub use report::ScanReport;

pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Fixed set of pending ports handed out through an atomic cursor.
///
/// Every index is returned by `claim` at most once, so no two workers ever
/// get the same port. `close` poisons the queue: all later claims return
/// `None` regardless of what is left.
pub struct WorkQueue {
    ports: Vec<u16>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl WorkQueue {
    pub fn new(range: PortRange) -> Self {
        Self {
            ports: range.ports().collect(),
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn claim(&self) -> Option<u16> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        self.ports.get(idx).copied()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }
}

/// Bounded pool of connect workers draining a [`WorkQueue`].
pub struct Scanner {
    prober: Arc<dyn Prober>,
    options: ScanOptions,
    progress: ProgressBar,
}

impl Scanner {
    pub fn new(prober: Arc<dyn Prober>, options: ScanOptions) -> Self {
        Self {
            prober,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Workers actually launched for `total` ports.
    pub fn worker_count(&self, total: usize) -> usize {
        self.options.concurrency.min(total).max(1)
    }

    /// Probe every port in `range` exactly once and return the open ones.
    ///
    /// Blocks until every worker has exited. If any probe reports the host as
    /// unreachable the remaining work is dropped and only the error is
    /// returned.
    pub async fn scan(&self, host: &str, range: PortRange) -> Result<ScanReport, ScanError> {
        let start_time = Utc::now();
        let host: Arc<str> = Arc::from(host);
        let queue = Arc::new(WorkQueue::new(range));
        let workers = self.worker_count(queue.len());

        info!(
            "scanning {} ports {} with {} workers, timeout {:?}",
            host, range, workers, self.options.timeout
        );
        self.progress.set_length(queue.len() as u64);

        let (open_tx, mut open_rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(worker(
                self.prober.clone(),
                host.clone(),
                queue.clone(),
                open_tx.clone(),
                self.options.timeout,
                self.progress.clone(),
            ));
        }
        drop(open_tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined.map_err(ScanError::from).and_then(|r| r) {
                queue.close();
                pool.abort_all();
                self.progress.abandon();
                debug!("scan of {} aborted: {}", host, err);
                return Err(err);
            }
        }

        let mut open_ports = BTreeSet::new();
        while let Some(port) = open_rx.recv().await {
            open_ports.insert(port);
        }
        self.progress.finish_and_clear();

        let report = ScanReport {
            host: host.to_string(),
            start_port: range.start(),
            end_port: range.end(),
            total_ports: range.len(),
            open_ports: open_ports.into_iter().collect(),
            concurrency: workers,
            timeout_ms: self.options.timeout.as_millis() as u64,
            start_time,
            end_time: Utc::now(),
        };
        info!(
            "scan of {} finished in {}ms: {} open",
            report.host,
            report.duration_ms(),
            report.open_ports.len()
        );
        Ok(report)
    }
}

async fn worker(
    prober: Arc<dyn Prober>,
    host: Arc<str>,
    queue: Arc<WorkQueue>,
    open_tx: mpsc::UnboundedSender<u16>,
    timeout: Duration,
    progress: ProgressBar,
) -> Result<(), ScanError> {
    while let Some(port) = queue.claim() {
        let target = Target::new(host.clone(), port);
        let outcome = prober.probe(&target, timeout).await;
        progress.inc(1);

        match outcome {
            ProbeOutcome::Open => {
                debug!("{} open", target);
                // The receiver outlives every worker unless the scan was aborted
                let _ = open_tx.send(port);
            }
            ProbeOutcome::Closed => {}
            ProbeOutcome::Unreachable(reason) => {
                queue.close();
                return Err(ScanError::HostUnreachable {
                    host: host.to_string(),
                    reason,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    /// Deterministic network: a fixed set of open ports, everything else closed.
    /// Records how often each port was probed.
    struct FakeNetwork {
        open: HashSet<u16>,
        calls: Mutex<HashMap<u16, usize>>,
    }

    impl FakeNetwork {
        fn new(open: impl IntoIterator<Item = u16>) -> Arc<Self> {
            Arc::new(Self {
                open: open.into_iter().collect(),
                calls: Mutex::new(HashMap::new()),
            })
        }

        fn calls(&self) -> HashMap<u16, usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Prober for FakeNetwork {
        async fn probe(&self, target: &Target, _timeout: Duration) -> ProbeOutcome {
            *self.calls.lock().unwrap().entry(target.port).or_insert(0) += 1;
            // Shuffle completion order between workers
            tokio::task::yield_now().await;
            if self.open.contains(&target.port) {
                ProbeOutcome::Open
            } else {
                ProbeOutcome::Closed
            }
        }
    }

    /// Host that never resolves. Optionally only the first probe fails.
    struct UnresolvableHost {
        attempts: AtomicUsize,
        only_first: bool,
    }

    #[async_trait]
    impl Prober for UnresolvableHost {
        async fn probe(&self, _target: &Target, _timeout: Duration) -> ProbeOutcome {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.only_first && n > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                return ProbeOutcome::Closed;
            }
            ProbeOutcome::Unreachable(probe::RESOLUTION_FAILED.to_string())
        }
    }

    /// Peer that never answers: every attempt runs into the per-port timeout.
    struct SilentHost {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Prober for SilentHost {
        async fn probe(&self, _target: &Target, timeout: Duration) -> ProbeOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let never = tokio::time::sleep(Duration::from_secs(30));
            match tokio::time::timeout(timeout, never).await {
                Ok(()) => ProbeOutcome::Open,
                Err(_) => ProbeOutcome::Closed,
            }
        }
    }

    /// Resolves every name to loopback and counts lookups.
    struct LoopbackResolver {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl probe::Resolver for LoopbackResolver {
        async fn lookup(&self, _host: &str, port: u16) -> std::io::Result<Vec<std::net::SocketAddr>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(vec![std::net::SocketAddr::from(([127, 0, 0, 1], port))])
        }
    }

    fn scanner(prober: Arc<dyn Prober>, concurrency: usize) -> Scanner {
        Scanner::new(
            prober,
            ScanOptions {
                concurrency,
                timeout: Duration::from_millis(100),
            },
        )
    }

    fn range(start: u32, end: u32) -> PortRange {
        PortRange::new(start, end).unwrap()
    }

    #[test]
    fn test_work_queue_claims_each_port_once() {
        let queue = WorkQueue::new(range(20, 25));
        let claimed: Vec<u16> = std::iter::from_fn(|| queue.claim()).collect();
        assert_eq!(claimed, vec![20, 21, 22, 23, 24, 25]);
        assert_eq!(queue.claim(), None);
    }

    #[test]
    fn test_closed_queue_hands_out_nothing() {
        let queue = WorkQueue::new(range(1, 100));
        assert_eq!(queue.claim(), Some(1));
        queue.close();
        assert_eq!(queue.claim(), None);
    }

    #[test]
    fn test_worker_count_is_capped_by_range() {
        let network = FakeNetwork::new(std::iter::empty());
        assert_eq!(scanner(network.clone(), 100).worker_count(6), 6);
        assert_eq!(scanner(network.clone(), 4).worker_count(6), 4);
        assert_eq!(scanner(network, 0).worker_count(6), 1);
    }

    #[tokio::test]
    async fn test_single_open_port() {
        let network = FakeNetwork::new([8080]);
        let report = scanner(network, DEFAULT_CONCURRENCY)
            .scan("localhost", range(8000, 8100))
            .await
            .unwrap();

        assert_eq!(report.open_ports, vec![8080]);
        assert_eq!(report.total_ports, 101);
        assert_eq!(report.concurrency, 100);
    }

    #[tokio::test]
    async fn test_all_closed_returns_empty() {
        let network = FakeNetwork::new(std::iter::empty());
        let report = scanner(network, DEFAULT_CONCURRENCY)
            .scan("localhost", range(1, 10))
            .await
            .unwrap();

        assert!(report.open_ports.is_empty());
        assert_eq!(report.concurrency, 10);
    }

    #[tokio::test]
    async fn test_serial_and_parallel_agree() {
        let network = FakeNetwork::new([21, 22, 25]);
        let serial = scanner(network.clone(), 1)
            .scan("localhost", range(20, 25))
            .await
            .unwrap();
        let parallel = scanner(network, 6)
            .scan("localhost", range(20, 25))
            .await
            .unwrap();

        assert_eq!(serial.open_ports, vec![21, 22, 25]);
        assert_eq!(serial.open_ports, parallel.open_ports);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_port_probed_exactly_once() {
        let open: Vec<u16> = (1000..=1200).filter(|p| p % 17 == 0).collect();

        for concurrency in [1, 2, 7, 64, 201, 500] {
            let network = FakeNetwork::new(open.clone());
            let report = scanner(network.clone(), concurrency)
                .scan("localhost", range(1000, 1200))
                .await
                .unwrap();

            let calls = network.calls();
            assert_eq!(calls.len(), 201, "concurrency {concurrency}: port skipped");
            assert!(
                (1000..=1200).all(|p| calls.get(&p) == Some(&1)),
                "concurrency {concurrency}: port probed more than once"
            );
            assert_eq!(report.open_ports, open);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_result_is_strictly_ascending() {
        let network = FakeNetwork::new([5000, 10, 443, 65535, 80, 1]);
        let report = scanner(network, 250)
            .scan("localhost", range(1, 65535))
            .await
            .unwrap();

        assert_eq!(report.open_ports, vec![1, 10, 80, 443, 5000, 65535]);
        assert!(report.open_ports.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rescan_is_idempotent() {
        let network = FakeNetwork::new([22, 80, 443, 8443]);
        let engine = scanner(network, 32);

        let first = engine.scan("localhost", range(1, 9000)).await.unwrap();
        let second = engine.scan("localhost", range(1, 9000)).await.unwrap();
        assert_eq!(first.open_ports, second.open_ports);
        assert_eq!(first.open_ports, vec![22, 80, 443, 8443]);
    }

    #[tokio::test]
    async fn test_timeouts_do_not_abort_scan() {
        let prober = Arc::new(SilentHost {
            attempts: AtomicUsize::new(0),
        });
        let started = std::time::Instant::now();

        let report = Scanner::new(
            prober.clone(),
            ScanOptions {
                concurrency: 10,
                timeout: Duration::from_millis(20),
            },
        )
        .scan("localhost", range(1, 30))
        .await
        .unwrap();

        assert!(report.open_ports.is_empty());
        assert_eq!(prober.attempts.load(Ordering::SeqCst), 30);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_fatal() {
        let prober = Arc::new(UnresolvableHost {
            attempts: AtomicUsize::new(0),
            only_first: false,
        });
        let concurrency = 10;

        let err = scanner(prober.clone(), concurrency)
            .scan("invalid.domain.xyz", range(1, 65535))
            .await
            .unwrap_err();

        assert!(err.is_host_unreachable());
        assert!(err.to_string().contains("Hostname could not be resolved"));
        assert!(prober.attempts.load(Ordering::SeqCst) <= concurrency);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fatal_stops_dispatch_promptly() {
        let prober = Arc::new(UnresolvableHost {
            attempts: AtomicUsize::new(0),
            only_first: true,
        });

        let err = scanner(prober.clone(), 8)
            .scan("flaky", range(1, 65535))
            .await
            .unwrap_err();

        assert!(err.is_host_unreachable());
        assert!(prober.attempts.load(Ordering::SeqCst) < 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_pool_resolves_host_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let resolver = Arc::new(LoopbackResolver {
            lookups: AtomicUsize::new(0),
        });

        let start = (port as u32).saturating_sub(50).clamp(1, 65436);
        let report = scanner(Arc::new(TcpProber::with_resolver(resolver.clone())), 100)
            .scan("scan.test", range(start, start + 99))
            .await
            .unwrap();

        assert_eq!(report.concurrency, 100);
        assert!(report.open_ports.contains(&port));
        assert_eq!(resolver.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_real_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let report = Scanner::new(Arc::new(TcpProber::new()), ScanOptions::default())
            .scan("127.0.0.1", range(port as u32, port as u32))
            .await
            .unwrap();
        assert_eq!(report.open_ports, vec![port]);
        assert_eq!(report.timeout_ms, 1000);
    }
}
