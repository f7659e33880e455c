use bytes::Bytes;

use crate::addr::{Addr, MessageFlags};
use crate::header::UnicastHeader;

pub const UNICAST_HEADER_KEY: &str = "unicast";

/// Insertion-ordered map of per-layer headers. Only this layer's own
/// header is populated in practice; the shape allows other layers to stamp
/// their own headers onto the same message without clobbering this one.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap(Vec<(&'static str, Bytes)>);

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap(Vec::new())
    }

    pub fn insert(&mut self, key: &'static str, value: Bytes) {
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// An application message flowing through the engine.
#[derive(Debug, Clone)]
pub struct Message {
    pub dest: Option<Addr>,
    pub src: Option<Addr>,
    pub payload: Bytes,
    pub headers: HeaderMap,
    pub flags: MessageFlags,
}

impl Message {
    pub fn new(dest: Option<Addr>, payload: Bytes) -> Self {
        Message {
            dest,
            src: None,
            payload,
            headers: HeaderMap::new(),
            flags: MessageFlags::NONE,
        }
    }

    pub fn oob(mut self) -> Self {
        self.flags.insert(MessageFlags::OOB);
        self
    }

    /// Copies payload and flags but not headers, matching the wire
    /// contract that this layer re-stamps its own header after copying
    /// (used for `handle_resend_first`'s "copy of the message" step).
    pub fn copy(&self) -> Self {
        Message {
            dest: self.dest,
            src: self.src,
            payload: self.payload.clone(),
            headers: HeaderMap::new(),
            flags: self.flags,
        }
    }

    pub fn set_unicast_header(&mut self, hdr: &UnicastHeader) {
        self.headers.insert(UNICAST_HEADER_KEY, hdr.encode());
    }
}
