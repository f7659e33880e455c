use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::addr::Addr;
use crate::config::Config;
use crate::message::Message;
use crate::stats::Stats;
use crate::transport::Transport;

/// Per-peer ordered buffer of unacknowledged messages, one retransmit task
/// per entry. The timer-queue idea follows `RetransmissionEngine`, but the
/// backoff schedule is a configured, plateauing list rather than doubling
/// forever, there is no give-up/`MAX_RETRIES`, and ACK is cumulative rather
/// than single-seqno.
#[derive(Default)]
pub struct SendWindow {
    entries: Mutex<BTreeMap<u64, Message>>,
}

impl SendWindow {
    pub fn new() -> Self {
        SendWindow::default()
    }

    /// Inserts `(seqno, msg)`. Does not arm any timer — the caller arms it
    /// outside whatever lock protects seqno issuance.
    pub fn add(&self, seqno: u64, msg: Message) {
        self.entries.lock().insert(seqno, msg);
    }

    /// Cumulative ACK: removes every entry with `seqno' <= seqno`.
    pub fn ack(&self, seqno: u64) {
        self.entries.lock().retain(|&k, _| k > seqno);
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn lowest(&self) -> Option<(u64, Message)> {
        self.entries
            .lock()
            .iter()
            .next()
            .map(|(seqno, msg)| (*seqno, msg.clone()))
    }

    /// Returns the message still awaiting ACK for `seqno`, or `None` if it
    /// has since been acknowledged (in which case the retransmit loop
    /// should stop).
    fn get(&self, seqno: u64) -> Option<Message> {
        self.entries.lock().get(&seqno).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Spawns the retransmission task for `(seqno, msg)` against `peer`. Fires
/// first at `timeouts[0]`, then backs off through the configured list,
/// plateauing at the last value, until the entry is gone from `window`
/// (ACKed, reset, or the connection was torn down).
pub fn spawn_retransmit_timer(
    window: Arc<SendWindow>,
    peer: Addr,
    seqno: u64,
    transport: Arc<dyn Transport>,
    config: Arc<Config>,
    stats: Arc<Stats>,
) {
    tokio::spawn(async move {
        let mut attempt = 0usize;
        loop {
            let delay = config.timeout_for_attempt(attempt);
            tokio::time::sleep(delay).await;

            let Some(msg) = window.get(seqno) else {
                break;
            };

            stats
                .num_xmits
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            debug!(peer = %peer, seqno, attempt, "retransmitting");

            if let Some(frame_payload) = msg.headers.get(crate::message::UNICAST_HEADER_KEY) {
                let envelope = crate::header::encode_envelope(
                    msg.flags.bits(),
                    &crate::header::UnicastHeader::decode(&mut frame_payload.clone())
                        .expect("stamped header must decode"),
                    &msg.payload,
                );
                if let Err(e) = transport.send(peer, envelope) {
                    warn!(peer = %peer, seqno, error = %e, "retransmit send failed, will retry");
                }
            }

            attempt += 1;
        }
    });
}
