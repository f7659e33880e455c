use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::addr::Addr;
use crate::config::DEFAULT_FIRST_SEQNO;
use crate::header::UnicastHeader;
use crate::message::Message;
use crate::recv_window::ReceiveWindow;
use crate::send_window::SendWindow;

/// One per peer we send to. `send_conn_id` is immutable for the
/// entry's lifetime; a replacement entry (after age-out/reset) always
/// gets a strictly greater id, assigned by the engine.
pub struct SenderEntry {
    pub send_conn_id: u64,
    next_seqno: Mutex<u64>,
    pub window: Arc<SendWindow>,
}

impl SenderEntry {
    pub fn new(send_conn_id: u64) -> Arc<SenderEntry> {
        Arc::new(SenderEntry {
            send_conn_id,
            next_seqno: Mutex::new(DEFAULT_FIRST_SEQNO),
            window: Arc::new(SendWindow::new()),
        })
    }

    /// Assigns the seqno, stamps the header, and inserts into the send
    /// window without arming a timer. Returns the assigned seqno and the
    /// stamped message so the caller can arm the retransmit timer outside
    /// this lock.
    pub fn reserve_and_insert(&self, mut msg: Message, ack_seqno: u64) -> (u64, Message) {
        let mut next_seqno = self.next_seqno.lock();
        let seqno = *next_seqno;
        let hdr = UnicastHeader::data(
            seqno,
            self.send_conn_id,
            seqno == DEFAULT_FIRST_SEQNO,
            ack_seqno,
        );
        msg.set_unicast_header(&hdr);
        self.window.add(seqno, msg.clone());
        *next_seqno += 1;
        (seqno, msg)
    }

    pub fn ack(&self, seqno: u64) {
        self.window.ack(seqno);
    }

    pub fn reset(&self) {
        self.window.reset();
    }
}

/// One per peer we receive from. Replaced wholesale (not mutated in
/// place) on peer restart, so `recv_conn_id` is immutable within one
/// incarnation.
pub struct ReceiverEntry {
    pub recv_conn_id: u64,
    pub window: Mutex<ReceiveWindow>,
    pub processing: AtomicBool,
}

impl ReceiverEntry {
    pub fn new(recv_conn_id: u64, initial_seqno: u64) -> Arc<ReceiverEntry> {
        Arc::new(ReceiverEntry {
            recv_conn_id,
            window: Mutex::new(ReceiveWindow::new(initial_seqno)),
            processing: AtomicBool::new(false),
        })
    }
}

/// The two concurrent mappings keyed by peer `Addr`. Backed by
/// `dashmap`, the way `cs-wwu-srg-elvis-public` uses it for concurrent
/// simulation state.
#[derive(Default)]
pub struct ConnTables {
    pub send_table: DashMap<Addr, Arc<SenderEntry>>,
    pub recv_table: DashMap<Addr, Arc<ReceiverEntry>>,
}

impl ConnTables {
    pub fn new() -> Self {
        ConnTables::default()
    }

    /// Check-and-put: returns the existing entry if present, otherwise
    /// creates one via `make_conn_id` (invoked at most once, only on the
    /// miss path).
    pub fn get_or_create_sender(
        &self,
        addr: Addr,
        make_conn_id: impl FnOnce() -> u64,
    ) -> Arc<SenderEntry> {
        self.send_table
            .entry(addr)
            .or_insert_with(|| SenderEntry::new(make_conn_id()))
            .clone()
    }

    pub fn get_sender(&self, addr: &Addr) -> Option<Arc<SenderEntry>> {
        self.send_table.get(addr).map(|e| e.clone())
    }

    pub fn get_receiver(&self, addr: &Addr) -> Option<Arc<ReceiverEntry>> {
        self.recv_table.get(addr).map(|e| e.clone())
    }

    pub fn insert_receiver(&self, addr: Addr, entry: Arc<ReceiverEntry>) {
        self.recv_table.insert(addr, entry);
    }

    pub fn remove_sender(&self, addr: &Addr) {
        self.send_table.remove(addr);
    }

    pub fn remove_receiver(&self, addr: &Addr) {
        self.recv_table.remove(addr);
    }

    pub fn remove_connection(&self, addr: &Addr) {
        self.remove_sender(addr);
        self.remove_receiver(addr);
    }

    pub fn remove_all(&self) {
        self.send_table.clear();
        self.recv_table.clear();
    }

    pub fn known_peers(&self) -> Vec<Addr> {
        let mut peers: Vec<Addr> = self.send_table.iter().map(|e| *e.key()).collect();
        for e in self.recv_table.iter() {
            if !peers.contains(e.key()) {
                peers.push(*e.key());
            }
        }
        peers
    }
}
