//! Fan-in of probe results into ordered host reports.
//!
//! Results arrive in completion order. Each host's results are buffered until
//! every requested port has resolved, then frozen into a [`HostReport`] sorted
//! by port. Hosts keep enumeration order regardless of when they finish.

use crate::types::{HostReport, ProbeResult, ScanResult};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use tracing::{debug, warn};

pub struct Aggregator {
    addrs: Vec<IpAddr>,
    ports_per_host: usize,
    pending: HashMap<usize, BTreeMap<u16, ProbeResult>>,
    done: Vec<Option<HostReport>>,
    completed: usize,
}

impl Aggregator {
    pub fn new(addrs: &[IpAddr], ports_per_host: usize) -> Self {
        let mut agg = Self {
            addrs: addrs.to_vec(),
            ports_per_host,
            pending: HashMap::new(),
            done: vec![None; addrs.len()],
            completed: 0,
        };
        if ports_per_host == 0 {
            for idx in 0..addrs.len() {
                agg.seal(idx, BTreeMap::new());
            }
        }
        agg
    }

    /// Record the result for host `host` (index into the address list).
    ///
    /// Returns the finished report when this result completes the host.
    pub fn record(&mut self, host: usize, result: ProbeResult) -> Option<&HostReport> {
        if host >= self.addrs.len() || self.done[host].is_some() {
            warn!(host, port = result.port, "result for unknown or finished host dropped");
            return None;
        }

        let slot = self.pending.entry(host).or_default();
        if slot.insert(result.port, result).is_some() {
            warn!(host, "duplicate probe result replaced");
        }
        if slot.len() < self.ports_per_host {
            return None;
        }

        let results = self.pending.remove(&host).unwrap_or_default();
        self.seal(host, results);
        self.done[host].as_ref()
    }

    fn seal(&mut self, host: usize, results: BTreeMap<u16, ProbeResult>) {
        let report = HostReport {
            ip: self.addrs[host].to_string(),
            ports: results.into_values().collect(),
        };
        debug!(ip = %report.ip, open = report.open_ports().count(), "host complete");
        self.done[host] = Some(report);
        self.completed += 1;
    }

    pub fn completed_hosts(&self) -> usize {
        self.completed
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.addrs.len()
    }

    /// All host reports in enumeration order, or `None` if any host is
    /// still missing results.
    pub fn finish(self) -> Option<ScanResult> {
        self.done.into_iter().collect()
    }
}
