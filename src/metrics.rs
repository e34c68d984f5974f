use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters for sync and session jobs
#[derive(Clone)]
pub struct Metrics {
    pub syncs_started: Arc<AtomicU64>,
    pub syncs_completed: Arc<AtomicU64>,
    pub syncs_failed: Arc<AtomicU64>,
    pub syncs_rejected: Arc<AtomicU64>,
    pub nodes_written: Arc<AtomicU64>,
    pub nodes_tombstoned: Arc<AtomicU64>,
    pub session_refreshes: Arc<AtomicU64>,
    pub session_failures: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            syncs_started: Arc::new(AtomicU64::new(0)),
            syncs_completed: Arc::new(AtomicU64::new(0)),
            syncs_failed: Arc::new(AtomicU64::new(0)),
            syncs_rejected: Arc::new(AtomicU64::new(0)),
            nodes_written: Arc::new(AtomicU64::new(0)),
            nodes_tombstoned: Arc::new(AtomicU64::new(0)),
            session_refreshes: Arc::new(AtomicU64::new(0)),
            session_failures: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_syncs_started(&self) {
        self.syncs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_syncs_completed(&self) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_syncs_failed(&self) {
        self.syncs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A trigger arrived while the account was already busy.
    pub fn inc_syncs_rejected(&self) {
        self.syncs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_nodes_written(&self, count: u64) {
        self.nodes_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_nodes_tombstoned(&self, count: u64) {
        self.nodes_tombstoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_session_refresh(&self, ok: bool) {
        if ok {
            self.session_refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.session_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            syncs_started: self.syncs_started.load(Ordering::Relaxed),
            syncs_completed: self.syncs_completed.load(Ordering::Relaxed),
            syncs_failed: self.syncs_failed.load(Ordering::Relaxed),
            syncs_rejected: self.syncs_rejected.load(Ordering::Relaxed),
            nodes_written: self.nodes_written.load(Ordering::Relaxed),
            nodes_tombstoned: self.nodes_tombstoned.load(Ordering::Relaxed),
            session_refreshes: self.session_refreshes.load(Ordering::Relaxed),
            session_failures: self.session_failures.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub syncs_started: u64,
    pub syncs_completed: u64,
    pub syncs_failed: u64,
    pub syncs_rejected: u64,
    pub nodes_written: u64,
    pub nodes_tombstoned: u64,
    pub session_refreshes: u64,
    pub session_failures: u64,
    pub uptime_seconds: u64,
}
