use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::addr::{Addr, MessageFlags};
use crate::age_out::{spawn_sweeper, AgeOutCache};
use crate::config::Config;
use crate::error::{Result, RunicastError};
use crate::header::{decode_envelope, encode_envelope, HeaderType, UnicastHeader};
use crate::message::Message;
use crate::piggyback;
use crate::recv_window::AddResult;
use crate::send_window::spawn_retransmit_timer;
use crate::stats::Stats;
use crate::tables::{ConnTables, ReceiverEntry};
use crate::transport::{Transport, Upcall};

/// The reliable-unicast protocol engine: the bidirectional element plugged
/// between an upper and a lower layer. Owns the per-peer send/receive state
/// and the send and receive paths that drive it, down to a single
/// reliable-FIFO channel per peer.
pub struct Engine {
    local_addr: RwLock<Option<Addr>>,
    members: RwLock<HashSet<Addr>>,
    tables: ConnTables,
    age_out: RwLock<Option<Arc<AgeOutCache>>>,
    last_conn_id: Mutex<u64>,
    disconnected: AtomicBool,
    started: AtomicBool,
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    upcall: Arc<dyn Upcall>,
    pub stats: Arc<Stats>,
    self_weak: OnceLock<Weak<Engine>>,
}

impl Engine {
    pub fn new(config: Config, transport: Arc<dyn Transport>, upcall: Arc<dyn Upcall>) -> Arc<Engine> {
        let engine = Arc::new(Engine {
            local_addr: RwLock::new(None),
            members: RwLock::new(HashSet::new()),
            tables: ConnTables::new(),
            age_out: RwLock::new(None),
            last_conn_id: Mutex::new(0),
            disconnected: AtomicBool::new(false),
            started: AtomicBool::new(false),
            config: Arc::new(config),
            transport,
            upcall,
            stats: Arc::new(Stats::new()),
            self_weak: OnceLock::new(),
        });
        let _ = engine.self_weak.set(Arc::downgrade(&engine));
        engine
    }

    // ---- lifecycle ----

    /// Acquires the timer handle, constructs the age-out cache if
    /// `max_retransmit_time > 0`, and marks the engine started. Refuses to
    /// start if no Tokio runtime is reachable from the calling thread —
    /// the only "configuration error" this engine treats as fatal.
    pub fn start(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RunicastError::NoRuntime);
        }
        if !self.config.max_retransmit_time.is_zero() {
            let cache = Arc::new(AgeOutCache::new(self.config.max_retransmit_time));
            *self.age_out.write() = Some(cache.clone());
            let weak = self.self_weak.get().cloned().unwrap_or_default();
            spawn_sweeper(cache, move |addr| {
                if let Some(engine) = weak.upgrade() {
                    engine.expired(addr);
                }
            });
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
        self.remove_all_connections();
        self.stats.undelivered_msgs.store(0, Ordering::Relaxed);
    }

    pub fn set_local_address(&self, addr: Addr) {
        *self.local_addr.write() = Some(addr);
        self.upcall.set_local_address(addr);
    }

    pub fn connect(&self) {
        self.disconnected.store(false, Ordering::Release);
        self.upcall.connect();
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
        self.upcall.disconnect();
    }

    pub fn view_change(&self, new_members: &[Addr]) {
        let new_set: HashSet<Addr> = new_members.iter().copied().collect();
        let known = self.tables.known_peers();
        let non_members: Vec<Addr> = known
            .into_iter()
            .filter(|addr| !new_set.contains(addr))
            .collect();

        *self.members.write() = new_set.clone();

        if let Some(cache) = self.age_out.read().as_ref() {
            cache.remove_all(|addr| new_set.contains(addr));
        }
        for addr in &non_members {
            self.tables.remove_connection(addr);
        }
        self.upcall.view_change(new_members);
    }

    fn expired(&self, addr: Addr) {
        debug!(peer = %addr, "age-out: tearing down idle connection");
        self.tables.remove_connection(&addr);
    }

    pub fn remove_all_connections(&self) {
        self.tables.remove_all();
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn is_member(&self, addr: &Addr) -> bool {
        self.members.read().contains(addr)
    }

    fn alloc_conn_id(&self) -> u64 {
        let now = now_ms();
        let mut last = self.last_conn_id.lock();
        let id = if now > *last { now } else { *last + 1 };
        *last = id;
        id
    }

    // ---- observability ----

    pub fn print_connections(&self) -> String {
        format!(
            "send_table={} recv_table={}",
            self.tables.send_table.len(),
            self.tables.recv_table.len()
        )
    }

    /// Count of messages sent but not yet acked, summed across every peer's
    /// send window.
    pub fn num_unacked_msgs(&self) -> usize {
        self.tables
            .send_table
            .iter()
            .map(|e| e.window.len())
            .sum()
    }

    /// Count of messages buffered in receive windows awaiting delivery
    /// (either gap fillers or OOB entries not yet drained), summed across
    /// every peer's receive window.
    pub fn num_msgs_in_recv_windows(&self) -> usize {
        self.tables
            .recv_table
            .iter()
            .map(|e| e.window.lock().len())
            .sum()
    }

    pub fn print_unacked_messages(&self) -> String {
        format!("num_unacked_msgs={}", self.num_unacked_msgs())
    }

    pub fn print_age_out_cache(&self) -> String {
        match self.age_out.read().as_ref() {
            Some(cache) => format!("age_out_cache size={}", cache.size()),
            None => "age_out_cache disabled".to_string(),
        }
    }

    // ---- send path ----

    pub fn send(&self, msg: Message) -> Result<()> {
        let dest = match msg.dest {
            Some(d) if !d.is_multicast() => d,
            _ => {
                trace!("pass-through send (no unicast destination)");
                let dest = msg.dest.unwrap_or(Addr::Multicast);
                if let Err(e) = self.transport.send(dest, msg.payload) {
                    warn!(error = %e, "pass-through transport send failed");
                }
                return Ok(());
            }
        };

        if !self.started.load(Ordering::Acquire) {
            trace!(peer = %dest, "engine not started, dropping send");
            return Ok(());
        }

        let entry = self.tables.get_or_create_sender(dest, || self.alloc_conn_id());
        if !self.is_member(&dest) {
            if let Some(cache) = self.age_out.read().as_ref() {
                cache.add(dest, Instant::now());
            }
        }

        let ack_seqno = piggyback::take_for(dest).unwrap_or(0);
        let (seqno, stamped) = entry.reserve_and_insert(msg, ack_seqno);

        // Arm outside the seqno lock: the costliest step,
        // kept out of the critical section.
        self.arm_retransmit(dest, seqno, &entry.window);

        let hdr = stamped
            .headers
            .get(crate::message::UNICAST_HEADER_KEY)
            .expect("reserve_and_insert always stamps a header")
            .clone();
        let hdr = UnicastHeader::decode(&mut { hdr }).expect("stamped header decodes");
        let envelope = encode_envelope(stamped.flags.bits(), &hdr, &stamped.payload);

        self.stats.num_msgs_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .num_bytes_sent
            .fetch_add(envelope.len() as u64, Ordering::Relaxed);
        if ack_seqno > 0 {
            self.stats.num_acks_sent.fetch_add(1, Ordering::Relaxed);
        }

        if let Err(e) = self.transport.send(dest, envelope) {
            warn!(peer = %dest, seqno, error = %e, "transport send failed, retransmitter will retry");
        }
        Ok(())
    }

    fn arm_retransmit(&self, peer: Addr, seqno: u64, window: &Arc<crate::send_window::SendWindow>) {
        let mut delay = Duration::from_millis(100);
        for attempt in 0..10u32 {
            if tokio::runtime::Handle::try_current().is_ok() {
                spawn_retransmit_timer(
                    window.clone(),
                    peer,
                    seqno,
                    self.transport.clone(),
                    self.config.clone(),
                    self.stats.clone(),
                );
                return;
            }
            if attempt == 9 {
                error!(peer = %peer, seqno, "failed to arm retransmit timer after 10 attempts");
                return;
            }
            std::thread::sleep(delay);
            delay *= 2;
        }
    }

    // ---- receive path ----

    pub fn on_receive(&self, src: Addr, frame: Bytes) -> Result<()> {
        let frame_len = frame.len() as u64;
        let (flags_byte, hdr, payload) = decode_envelope(frame)?;

        self.stats.num_msgs_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .num_bytes_received
            .fetch_add(frame_len, Ordering::Relaxed);

        let mut msg = Message::new(self.local_addr.read().as_ref().copied(), payload);
        msg.src = Some(src);
        msg.flags = MessageFlags::from_bits(flags_byte);

        match hdr.header_type {
            HeaderType::Ack => {
                self.handle_ack(src, hdr.seqno);
            }
            HeaderType::SendFirstSeqno => {
                self.handle_resend_first(src);
            }
            HeaderType::Data => {
                if hdr.ack > 0 {
                    self.handle_ack(src, hdr.ack);
                }
                self.handle_data(src, hdr.seqno, hdr.conn_id, hdr.first, msg);
            }
        }
        Ok(())
    }

    fn handle_ack(&self, sender: Addr, seqno: u64) {
        if let Some(entry) = self.tables.get_sender(&sender) {
            entry.ack(seqno);
        }
        self.stats.num_acks_received.fetch_add(1, Ordering::Relaxed);
    }

    fn handle_resend_first(&self, sender: Addr) {
        let Some(entry) = self.tables.get_sender(&sender) else {
            return;
        };
        let Some((seqno, original)) = entry.window.lowest() else {
            return;
        };
        let mut copy = original.copy();
        let hdr = UnicastHeader::data(seqno, entry.send_conn_id, true, 0);
        copy.set_unicast_header(&hdr);
        let envelope = encode_envelope(copy.flags.bits(), &hdr, &copy.payload);
        if let Err(e) = self.transport.send(sender, envelope) {
            warn!(peer = %sender, seqno, error = %e, "resend-first transport send failed");
        }
    }

    fn handle_data(&self, sender: Addr, seqno: u64, conn_id: u64, first: bool, msg: Message) {
        let entry = match self.receiver_for(sender, seqno, conn_id, first) {
            Some(entry) => entry,
            None => {
                self.send_control(sender, UnicastHeader::send_first_seqno());
                return;
            }
        };

        let is_oob = msg.flags.contains(MessageFlags::OOB);
        let msg_for_oob_delivery = msg.clone();
        let result = entry.window.lock().add(seqno, msg);

        if result == AddResult::New && !is_oob {
            self.stats.undelivered_msgs.fetch_add(1, Ordering::Relaxed);
        }

        if result == AddResult::DuplicateDelivered {
            self.send_explicit_ack(sender, seqno);
        }

        if is_oob && result == AddResult::New {
            let piggybacked = self.handle_oob_new(&entry, sender, msg_for_oob_delivery);
            if piggybacked {
                return;
            }
        }

        self.drain_receiver(&entry, sender);
    }

    /// Looks up (or creates, or replaces) the `ReceiverEntry` for `sender`
    /// per the `first`/`conn_id` rules for the connection. Returns `None` when there
    /// is no valid state and the caller must ask the sender to resend its
    /// first message.
    fn receiver_for(&self, sender: Addr, seqno: u64, conn_id: u64, first: bool) -> Option<Arc<ReceiverEntry>> {
        if first {
            match self.tables.get_receiver(&sender) {
                None => {
                    let entry = ReceiverEntry::new(conn_id, seqno);
                    self.tables.insert_receiver(sender, entry.clone());
                    Some(entry)
                }
                Some(existing) if existing.recv_conn_id != conn_id => {
                    debug!(peer = %sender, "peer restart detected, resetting receive state");
                    self.tables.remove_receiver(&sender);
                    let entry = ReceiverEntry::new(conn_id, seqno);
                    self.tables.insert_receiver(sender, entry.clone());
                    Some(entry)
                }
                Some(existing) => Some(existing),
            }
        } else {
            match self.tables.get_receiver(&sender) {
                Some(existing) if existing.recv_conn_id == conn_id => Some(existing),
                _ => None,
            }
        }
    }

    /// Delivers a newly-arrived OOB message via the fast path. Returns
    /// whether the piggyback-was-enqueued branch was taken — the caller
    /// must only skip the regular drain when this is `true`; otherwise a
    /// message already buffered below this one would be stuck waiting on
    /// some unrelated future drain.
    fn handle_oob_new(&self, entry: &Arc<ReceiverEntry>, sender: Addr, msg: Message) -> bool {
        let (highest_oob, has_contiguous) = {
            let mut w = entry.window.lock();
            let highest = w.remove_oob_messages();
            let contiguous = w.has_messages_to_remove();
            (highest, contiguous)
        };

        let should_ack_now =
            self.stats.undelivered_msgs.load(Ordering::Relaxed) == 0 || !has_contiguous;

        if should_ack_now {
            if let Some(h) = highest_oob {
                self.send_piggyback_ack(sender, h);
            }
        }

        self.upcall.deliver(msg);

        if highest_oob.is_some() {
            if let Some((addr, seqno)) = piggyback::drain() {
                self.send_explicit_ack(addr, seqno);
            }
        }

        should_ack_now
    }

    fn drain_receiver(&self, entry: &Arc<ReceiverEntry>, sender: Addr) {
        if entry
            .processing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return; // another drainer is active
        }

        let mut num_regular_removed: i64 = 0;
        loop {
            let msgs = entry.window.lock().remove_many();
            if msgs.is_empty() {
                break;
            }
            let highest_seqno = msgs.last().map(|(seqno, _)| *seqno).unwrap();
            self.send_piggyback_ack(sender, highest_seqno);

            for (_, m) in msgs {
                if m.flags.contains(MessageFlags::OOB) {
                    continue; // already delivered via the OOB fast path
                }
                num_regular_removed += 1;
                self.upcall.deliver(m);
            }

            if let Some((addr, seqno)) = piggyback::drain() {
                self.send_explicit_ack(addr, seqno);
            }
        }

        self.stats
            .undelivered_msgs
            .fetch_sub(num_regular_removed, Ordering::Relaxed);
        entry.processing.store(false, Ordering::Release);
    }

    /// Enqueues `seqno` into the pending piggyback slot for `peer`,
    /// flushing whatever was already there for a different peer.
    fn send_piggyback_ack(&self, peer: Addr, seqno: u64) {
        if let Some((addr, prev_seqno)) = piggyback::set(peer, seqno) {
            self.send_explicit_ack(addr, prev_seqno);
        }
    }

    fn send_explicit_ack(&self, peer: Addr, seqno: u64) {
        if self.disconnected.load(Ordering::Acquire) {
            return;
        }
        self.send_control(peer, UnicastHeader::ack(seqno));
        self.stats.num_acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn send_control(&self, peer: Addr, hdr: UnicastHeader) {
        if self.disconnected.load(Ordering::Acquire) {
            return;
        }
        let envelope = encode_envelope(0, &hdr, &[]);
        if let Err(e) = self.transport.send(peer, envelope) {
            warn!(peer = %peer, error = %e, "control frame send failed");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
