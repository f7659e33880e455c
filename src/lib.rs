//! Reliable point-to-point (unicast) delivery over an unreliable, reordering,
//! duplicating datagram transport: per-peer FIFO, exactly-once, in-order
//! delivery, with an out-of-band fast path for messages that don't need to
//! wait on it.
//!
//! A thin re-export surface over the internal modules, with [`Engine`] as
//! the one type applications construct and drive.

mod addr;
mod age_out;
mod config;
mod error;
mod header;
mod message;
mod piggyback;
mod recv_window;
mod send_window;
mod stats;
mod tables;
mod transport;

mod engine;

pub use addr::{Addr, MessageFlags};
pub use config::Config;
pub use error::{Result, RunicastError};
pub use header::{HeaderType, UnicastHeader, HEADER_LEN};
pub use message::{HeaderMap, Message};
pub use recv_window::AddResult;
pub use stats::Stats;
pub use transport::{Transport, Upcall};

pub use engine::Engine;
