use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Observability surface: counters plus debug dumps. Non-essential to
/// correctness but useful for test introspection and operator debugging.
#[derive(Debug, Default)]
pub struct Stats {
    pub num_msgs_sent: AtomicU64,
    pub num_msgs_received: AtomicU64,
    pub num_bytes_sent: AtomicU64,
    pub num_bytes_received: AtomicU64,
    pub num_acks_sent: AtomicU64,
    pub num_acks_received: AtomicU64,
    pub num_xmits: AtomicU64,
    pub undelivered_msgs: AtomicI64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn reset(&self) {
        self.num_msgs_sent.store(0, Ordering::Relaxed);
        self.num_msgs_received.store(0, Ordering::Relaxed);
        self.num_bytes_sent.store(0, Ordering::Relaxed);
        self.num_bytes_received.store(0, Ordering::Relaxed);
        self.num_acks_sent.store(0, Ordering::Relaxed);
        self.num_acks_received.store(0, Ordering::Relaxed);
        self.num_xmits.store(0, Ordering::Relaxed);
        self.undelivered_msgs.store(0, Ordering::Relaxed);
    }

    pub fn summary(&self) -> String {
        format!(
            "sent={}/{}B received={}/{}B acks_sent={} acks_received={} xmits={} undelivered={}",
            self.num_msgs_sent.load(Ordering::Relaxed),
            self.num_bytes_sent.load(Ordering::Relaxed),
            self.num_msgs_received.load(Ordering::Relaxed),
            self.num_bytes_received.load(Ordering::Relaxed),
            self.num_acks_sent.load(Ordering::Relaxed),
            self.num_acks_received.load(Ordering::Relaxed),
            self.num_xmits.load(Ordering::Relaxed),
            self.undelivered_msgs.load(Ordering::Relaxed),
        )
    }
}
