use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::addr::Addr;

/// Evicts idle peer connections after a configured timeout. Generalizes
/// `mux.rs`'s `remove_closed_streams` one-shot GC pass into a timeout-driven
/// sweep, since this layer has no "closed" state to react to — only
/// elapsed time.
pub struct AgeOutCache {
    entries: DashMap<Addr, Instant>,
    timeout: RwLock<Duration>,
}

impl AgeOutCache {
    pub fn new(timeout: Duration) -> Self {
        AgeOutCache {
            entries: DashMap::new(),
            timeout: RwLock::new(timeout),
        }
    }

    pub fn add(&self, addr: Addr, now: Instant) {
        self.entries.insert(addr, now);
    }

    pub fn remove(&self, addr: &Addr) {
        self.entries.remove(addr);
    }

    /// Removes every tracked entry whose key is in `keep` (membership
    /// already guarantees liveness for current members).
    pub fn remove_all(&self, keep: impl Fn(&Addr) -> bool) {
        self.entries.retain(|addr, _| !keep(addr));
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    /// Returns every Addr whose age exceeds the timeout as of `now`,
    /// removing them from the cache. Callers fire `expired(Addr)` for each.
    pub fn sweep(&self, now: Instant) -> Vec<Addr> {
        let timeout = self.timeout();
        let expired: Vec<Addr> = self
            .entries
            .iter()
            .filter(|entry| now.saturating_duration_since(*entry.value()) >= timeout)
            .map(|entry| *entry.key())
            .collect();
        for addr in &expired {
            self.entries.remove(addr);
        }
        expired
    }
}

/// Periodically sweeps `cache` and invokes `on_expired` for each evicted
/// peer. Sweep cadence is `max(timeout / 4, 50ms)` — not specified by the
/// spec, recorded as an Open Question resolution in DESIGN.md.
pub fn spawn_sweeper<F>(cache: Arc<AgeOutCache>, on_expired: F)
where
    F: Fn(Addr) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let interval = (cache.timeout() / 4).max(Duration::from_millis(50));
            tokio::time::sleep(interval).await;
            for addr in cache.sweep(Instant::now()) {
                on_expired(addr);
            }
        }
    });
}
