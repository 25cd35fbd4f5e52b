//! Cache of scans and results to reduce the load on the RPC endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vsr_snapshot_lib::{Snapshot, Timestamp, WalletId};

/// Last scan and the results computed from it.
///
/// Results are keyed by wallet and snapshot time, so they can only be served
/// for the snapshot they were computed on. Everything goes stale together
/// after `ttl`, or on [`Cache::reset`].
#[derive(Clone)]
pub struct Cache<T> {
    ttl: Duration,
    snapshot: Option<Arc<Snapshot>>,
    last_load: Option<Instant>,
    results: HashMap<(WalletId, Timestamp), T>,
}

impl<T: Clone> Cache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: None,
            last_load: None,
            results: HashMap::new(),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.last_load
            .map_or(true, |last_load| last_load.elapsed() >= self.ttl)
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        if self.is_stale() {
            return None;
        }
        self.snapshot.clone()
    }

    /// Replaces the scan, dropping every result computed on the previous one.
    pub fn set_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.snapshot = Some(snapshot);
        self.results.clear();
        self.last_load = Some(Instant::now());
    }

    pub fn result(&self, wallet: &WalletId, snapshot_time: Timestamp) -> Option<T> {
        if self.is_stale() {
            return None;
        }
        self.results.get(&(*wallet, snapshot_time)).cloned()
    }

    pub fn insert_result(&mut self, wallet: WalletId, snapshot_time: Timestamp, result: T) {
        self.results.insert((wallet, snapshot_time), result);
    }

    pub fn reset(&mut self) {
        self.snapshot = None;
        self.last_load = None;
        self.results.clear();
    }
}
