//! Per-node protocol counters
//!
//! Rendered in Prometheus text format by the `/metrics` endpoint.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for tracking event counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters of one node
#[derive(Debug, Default)]
pub struct NodeMetrics {
    pub writes_total: Counter,
    pub writes_committed: Counter,
    pub writes_not_primary: Counter,
    pub writes_quorum_failed: Counter,
    pub writes_local_failed: Counter,
    pub replication_failures: Counter,
    pub replications_applied: Counter,
    pub votes_cast: Counter,
    pub reads_total: Counter,
    pub reads_not_found: Counter,
    pub bytes_written: Counter,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export counters in Prometheus text format
    pub fn to_prometheus(&self, datacenter: &str) -> String {
        let counters: [(&str, &str, &Counter); 11] = [
            ("minifs_writes_total", "Write requests received", &self.writes_total),
            ("minifs_writes_committed_total", "Writes committed on this primary", &self.writes_committed),
            ("minifs_writes_not_primary_total", "Writes rejected because this node is not primary", &self.writes_not_primary),
            ("minifs_writes_quorum_failed_total", "Writes aborted for lack of quorum", &self.writes_quorum_failed),
            ("minifs_writes_local_failed_total", "Writes aborted by a local storage failure", &self.writes_local_failed),
            ("minifs_replication_failures_total", "Replica pushes that failed", &self.replication_failures),
            ("minifs_replications_applied_total", "Replicated files applied locally", &self.replications_applied),
            ("minifs_votes_cast_total", "Votes answered", &self.votes_cast),
            ("minifs_reads_total", "Read requests served", &self.reads_total),
            ("minifs_reads_not_found_total", "Reads of files absent locally", &self.reads_not_found),
            ("minifs_bytes_written_total", "Bytes committed or replicated locally", &self.bytes_written),
        ];

        let mut out = String::new();
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(
                out,
                "{}{{datacenter=\"{}\"}} {}",
                name,
                datacenter,
                counter.get()
            );
        }
        out
    }
}
