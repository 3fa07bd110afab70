//! Direct-TCP framing: a zero byte followed by a 24-bit big-endian length

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length prefix size in bytes
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest payload expressible in 24 bits
pub const MAX_FRAME_LENGTH: usize = 0x00FF_FFFF;

/// Prefix `payload` with its Direct-TCP header
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_FRAME_LENGTH {
        return Err(Error::InvalidParameter(format!(
            "frame length {} exceeds maximum {}",
            payload.len(),
            MAX_FRAME_LENGTH
        )));
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Split one complete frame payload off the front of `buf`.
///
/// Returns `Ok(None)` until the whole frame has arrived. A non-zero type byte
/// is a framing error; the stream cannot be resynchronised after it.
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<BytesMut>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    if buf[0] != 0 {
        return Err(Error::Protocol(format!(
            "unexpected Direct-TCP frame type 0x{:02x}",
            buf[0]
        )));
    }

    let length = ((buf[1] as usize) << 16) | ((buf[2] as usize) << 8) | (buf[3] as usize);
    if buf.len() < FRAME_HEADER_SIZE + length {
        buf.reserve(FRAME_HEADER_SIZE + length - buf.len());
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_SIZE);
    Ok(Some(buf.split_to(length)))
}
