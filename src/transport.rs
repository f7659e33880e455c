use bytes::Bytes;

use crate::addr::Addr;
use crate::error::Result;
use crate::message::Message;

/// The layer below: an unreliable, possibly-reordering, possibly-duplicating
/// datagram transport addressed by `Addr`. Out of scope per the design —
/// this is the interface the core uses, not a concrete implementation.
pub trait Transport: Send + Sync {
    fn send(&self, dest: Addr, frame: Bytes) -> Result<()>;
}

/// The layer above: consumes delivered messages and membership/lifecycle
/// pass-through events. Never reentered while the engine holds an internal
/// lock.
pub trait Upcall: Send + Sync {
    fn deliver(&self, msg: Message);

    fn view_change(&self, _members: &[Addr]) {}
    fn set_local_address(&self, _addr: Addr) {}
    fn connect(&self) {}
    fn disconnect(&self) {}
}
