use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RunicastError};

/// `UnicastHeader`'s `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Data = 0x01,
    Ack = 0x02,
    SendFirstSeqno = 0x03,
}

impl TryFrom<u8> for HeaderType {
    type Error = RunicastError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(HeaderType::Data),
            0x02 => Ok(HeaderType::Ack),
            0x03 => Ok(HeaderType::SendFirstSeqno),
            other => Err(RunicastError::UnknownHeaderType(other)),
        }
    }
}

/// Fixed-width wire header: `type:1 | seqno:8 | conn_id:8 | first:1 | ack:8`,
/// all multi-byte integers big-endian. Always 26 bytes regardless of
/// `header_type`; fields unused by a given type are zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicastHeader {
    pub header_type: HeaderType,
    pub seqno: u64,
    pub conn_id: u64,
    pub first: bool,
    pub ack: u64,
}

pub const HEADER_LEN: usize = 1 + 8 + 8 + 1 + 8;

impl UnicastHeader {
    pub fn data(seqno: u64, conn_id: u64, first: bool, ack: u64) -> Self {
        UnicastHeader {
            header_type: HeaderType::Data,
            seqno,
            conn_id,
            first,
            ack,
        }
    }

    pub fn ack(seqno: u64) -> Self {
        UnicastHeader {
            header_type: HeaderType::Ack,
            seqno,
            conn_id: 0,
            first: false,
            ack: 0,
        }
    }

    pub fn send_first_seqno() -> Self {
        UnicastHeader {
            header_type: HeaderType::SendFirstSeqno,
            seqno: 0,
            conn_id: 0,
            first: false,
            ack: 0,
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.header_type as u8);
        buf.put_u64(self.seqno);
        buf.put_u64(self.conn_id);
        buf.put_u8(if self.first { 1 } else { 0 });
        buf.put_u64(self.ack);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<UnicastHeader> {
        ensure_len(buf, HEADER_LEN)?;
        let header_type = HeaderType::try_from(buf.get_u8())?;
        let seqno = buf.get_u64();
        let conn_id = buf.get_u64();
        let first = buf.get_u8() != 0;
        let ack = buf.get_u64();
        Ok(UnicastHeader {
            header_type,
            seqno,
            conn_id,
            first,
            ack,
        })
    }
}

fn ensure_len(buf: &impl Buf, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(RunicastError::HeaderTooShort {
            expected: needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

/// Wire envelope carried by the transport below: a one-byte flags prefix
/// (currently just the OOB bit), the fixed header, and the remaining bytes
/// as payload. Framing relies on the transport preserving datagram
/// boundaries, so there is no length prefix on the payload.
pub fn encode_envelope(flags_byte: u8, hdr: &UnicastHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + hdr.encoded_len() + payload.len());
    buf.put_u8(flags_byte);
    hdr.encode_into(&mut buf);
    buf.extend_from_slice(payload);
    buf.freeze()
}

pub fn decode_envelope(mut bytes: Bytes) -> Result<(u8, UnicastHeader, Bytes)> {
    ensure_len(&bytes, 1)?;
    let flags_byte = bytes.get_u8();
    let hdr = UnicastHeader::decode(&mut bytes)?;
    Ok((flags_byte, hdr, bytes))
}
