use std::cell::RefCell;

use crate::addr::Addr;

// Request-scoped, single-slot holder for an ACK waiting to piggyback on an
// outgoing DATA message to the same peer. Thread-local rather
// than a context parameter: the receive path's upcall re-enters the send
// path through an opaque upper-layer API, so there is no parameter to
// thread the value through short of a thread-local (or task-local)
// variable living across that boundary.
thread_local! {
    static PENDING_ACK: RefCell<Option<(Addr, u64)>> = const { RefCell::new(None) };
}

/// Record that `seqno` should be piggybacked on the next outgoing DATA to
/// `addr`. If a different peer's ACK was already pending, it is returned
/// so the caller can flush it explicitly instead of losing it. Writing the
/// same peer again just replaces the seqno (monotonic within one slot).
pub fn set(addr: Addr, seqno: u64) -> Option<(Addr, u64)> {
    PENDING_ACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        match *slot {
            Some((prev_addr, _)) if prev_addr != addr => slot.replace((addr, seqno)),
            _ => {
                *slot = Some((addr, seqno));
                None
            }
        }
    })
}

/// Remove and return the pending seqno for `addr`, if any. Leaves the slot
/// untouched if it holds a different peer's ACK.
pub fn take_for(addr: Addr) -> Option<u64> {
    PENDING_ACK.with(|slot| {
        let mut slot = slot.borrow_mut();
        match *slot {
            Some((a, seqno)) if a == addr => {
                *slot = None;
                Some(seqno)
            }
            _ => None,
        }
    })
}

/// Remove and return whatever is pending, regardless of address. Used to
/// flush the slot at the end of the receive-path drain loop.
pub fn drain() -> Option<(Addr, u64)> {
    PENDING_ACK.with(|slot| slot.borrow_mut().take())
}
