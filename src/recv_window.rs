use std::collections::BTreeMap;

use crate::addr::MessageFlags;
use crate::message::Message;

/// Result of inserting a message into a [`ReceiveWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    New,
    DuplicatePending,
    DuplicateDelivered,
}

/// Per-peer gap-free reassembly buffer. The `BTreeMap` contiguous-prefix
/// drain follows `transport/reliable_ordered.rs`'s `ReliableOrderedReceiver`,
/// extended with the NEW/DUPLICATE_PENDING/DUPLICATE_DELIVERED
/// classification and an OOB fast path that single-mode receiver has no use
/// for.
pub struct ReceiveWindow {
    next_to_remove: u64,
    buffer: BTreeMap<u64, Message>,
}

impl ReceiveWindow {
    pub fn new(initial_seqno: u64) -> Self {
        ReceiveWindow {
            next_to_remove: initial_seqno,
            buffer: BTreeMap::new(),
        }
    }

    pub fn next_to_remove(&self) -> u64 {
        self.next_to_remove
    }

    pub fn add(&mut self, seqno: u64, msg: Message) -> AddResult {
        if seqno < self.next_to_remove {
            return AddResult::DuplicateDelivered;
        }
        if self.buffer.contains_key(&seqno) {
            return AddResult::DuplicatePending;
        }
        self.buffer.insert(seqno, msg);
        AddResult::New
    }

    /// Extracts the contiguous prefix starting at `next_to_remove`,
    /// advancing the cursor past it, in ascending seqno order. Seqnos are
    /// returned alongside each message so the caller can piggyback/ack the
    /// highest one without re-deriving it from the message itself.
    pub fn remove_many(&mut self) -> Vec<(u64, Message)> {
        let mut out = Vec::new();
        while let Some(msg) = self.buffer.remove(&self.next_to_remove) {
            out.push((self.next_to_remove, msg));
            self.next_to_remove += 1;
        }
        out
    }

    /// Returns the highest seqno among buffered OOB entries with
    /// `seqno >= next_to_remove`, or `None` if there are none. OOB entries
    /// are *not* removed from the buffer so the regular drain still sees
    /// them as gap fillers.
    pub fn remove_oob_messages(&mut self) -> Option<u64> {
        self.buffer
            .iter()
            .filter(|(&seqno, msg)| seqno >= self.next_to_remove && msg.flags.contains(MessageFlags::OOB))
            .map(|(&seqno, _)| seqno)
            .max()
    }

    pub fn has_messages_to_remove(&self) -> bool {
        self.buffer.contains_key(&self.next_to_remove)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
