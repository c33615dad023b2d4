use crate::aggregator::Aggregator;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::ports::{parse_port_spec, PortSet};
use crate::probe::Prober;
use crate::targets::parse_targets;
use crate::types::{ProbeResult, ScanResult};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scan every (address, port) pair and return one report per address.
///
/// - `config.concurrency` workers drain a bounded task queue, so at most that
///   many probes are in flight.
/// - A single collector groups results per host; output order follows
///   `targets`, ports ascend within each host.
pub async fn scan_targets(
    targets: &[IpAddr],
    ports: &PortSet,
    config: ScanConfig,
) -> Result<ScanResult, ScanError> {
    scan_targets_with_cancel(
        targets,
        ports,
        config,
        CancellationToken::new(),
        SharedProgress::new(),
    )
    .await
}

/// Parse target and port specs, then scan. Nothing is probed if parsing fails.
pub async fn scan_specs<S: AsRef<str>>(
    targets: &[S],
    ports: &str,
    config: ScanConfig,
) -> Result<ScanResult, ScanError> {
    let addrs = parse_targets(targets)?;
    let ports = parse_port_spec(ports)?;
    scan_targets(&addrs, &ports, config).await
}

/// Progress counters readable while a scan runs.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    pub total: Arc<AtomicU64>,
    pub done: Arc<AtomicU64>,
    pub open: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub done: u64,
    pub open: u64,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            open: self.open.load(Ordering::Relaxed),
        }
    }

    fn record(&self, open: bool) {
        if open {
            self.open.fetch_add(1, Ordering::Relaxed);
        }
        self.done.fetch_add(1, Ordering::Relaxed);
    }
}

struct Task {
    host: usize,
    ip: IpAddr,
    port: u16,
}

/// Variant that can be aborted through `cancel` and reports progress.
///
/// Workers check the token before each probe. A cancelled scan yields
/// [`ScanError::Cancelled`] rather than a partial result.
pub async fn scan_targets_with_cancel(
    targets: &[IpAddr],
    ports: &PortSet,
    config: ScanConfig,
    cancel: CancellationToken,
    progress: SharedProgress,
) -> Result<ScanResult, ScanError> {
    let config = config.validate()?;
    let workers = config.concurrency;
    let total = targets.len() as u64 * ports.len() as u64;
    progress.total.store(total, Ordering::Relaxed);
    info!(hosts = targets.len(), ports = ports.len(), workers, "scan started");
    let started = Instant::now();

    let prober = Arc::new(Prober::new(config.timeout()));
    let (task_tx, task_rx) = mpsc::channel::<Task>(workers * 2);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<(usize, ProbeResult)>(workers * 2);
    let mut set = JoinSet::new();

    let feed_targets = targets.to_vec();
    let feed_ports: Vec<u16> = ports.iter().copied().collect();
    let feed_cancel = cancel.clone();
    set.spawn(async move {
        'hosts: for (host, &ip) in feed_targets.iter().enumerate() {
            for &port in &feed_ports {
                tokio::select! {
                    _ = feed_cancel.cancelled() => break 'hosts,
                    sent = task_tx.send(Task { host, ip, port }) => {
                        if sent.is_err() {
                            break 'hosts;
                        }
                    }
                }
            }
        }
        // task_tx drops here, closing the queue.
    });

    for worker in 0..workers {
        let task_rx = task_rx.clone();
        let result_tx = result_tx.clone();
        let prober = prober.clone();
        let cancel = cancel.clone();
        let progress = progress.clone();
        set.spawn(async move {
            loop {
                let task = task_rx.lock().await.recv().await;
                let Some(task) = task else { break };
                if cancel.is_cancelled() {
                    debug!(worker, "cancelled, worker exiting");
                    break;
                }
                let result = prober.probe(task.ip, task.port).await;
                progress.record(result.open);
                if result_tx.send((task.host, result)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    let mut aggregator = Aggregator::new(targets, ports.len());
    while let Some((host, result)) = result_rx.recv().await {
        aggregator.record(host, result);
    }

    let mut failure = None;
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "scan task failed");
            failure.get_or_insert_with(|| e.to_string());
        }
    }

    if let Some(reason) = failure {
        return Err(ScanError::Worker(reason));
    }
    if cancel.is_cancelled() && !aggregator.is_complete() {
        info!(
            hosts_done = aggregator.completed_hosts(),
            "scan cancelled"
        );
        return Err(ScanError::Cancelled);
    }

    let result = aggregator.finish().ok_or(ScanError::Cancelled)?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        open = progress.snapshot().open,
        "scan finished"
    );
    Ok(result)
}
