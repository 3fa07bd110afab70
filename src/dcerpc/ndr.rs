//! NDR (Network Data Representation) encoding/decoding for DCE/RPC
//!
//! Little-endian, ASCII, IEEE data representation only; that is the only
//! format the client ever advertises. Alignment is relative to the start of
//! the stub data.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Data representation label sent in every PDU header
pub const NDR_DATA_REPRESENTATION: [u8; 4] = [0x10, 0x00, 0x00, 0x00];

/// First referent id handed out for non-null pointers
const FIRST_REFERENT: u32 = 0x0002_0000;

/// NDR encoder
pub struct NdrEncoder {
    buffer: Vec<u8>,
    next_referent: u32,
}

impl Default for NdrEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NdrEncoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            next_referent: FIRST_REFERENT,
        }
    }

    /// Get the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn align(&mut self, alignment: usize) {
        let padding = (alignment - (self.buffer.len() % alignment)) % alignment;
        self.buffer.resize(self.buffer.len() + padding, 0);
    }

    pub fn encode_u8(&mut self, value: u8) -> Result<()> {
        self.buffer.write_u8(value)?;
        Ok(())
    }

    pub fn encode_u16(&mut self, value: u16) -> Result<()> {
        self.align(2);
        self.buffer.write_u16::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn encode_u32(&mut self, value: u32) -> Result<()> {
        self.align(4);
        self.buffer.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn encode_u64(&mut self, value: u64) -> Result<()> {
        self.align(8);
        self.buffer.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write the referent id of a unique or full pointer; `false` writes NULL
    pub fn encode_pointer(&mut self, present: bool) -> Result<()> {
        if present {
            let referent = self.next_referent;
            self.next_referent += 4;
            self.encode_u32(referent)
        } else {
            self.encode_u32(0)
        }
    }

    /// Conformant varying UTF-16 string including its terminator
    pub fn encode_string(&mut self, string: &str) -> Result<()> {
        let utf16: Vec<u16> = string.encode_utf16().chain(std::iter::once(0)).collect();
        let count = utf16.len() as u32;
        self.encode_u32(count)?; // max count
        self.encode_u32(0)?; // offset
        self.encode_u32(count)?; // actual count
        for ch in utf16 {
            self.encode_u16(ch)?;
        }
        Ok(())
    }

    /// `[unique, string]` pointer with its string inline
    pub fn encode_unique_string(&mut self, value: Option<&str>) -> Result<()> {
        self.encode_pointer(value.is_some())?;
        if let Some(s) = value {
            self.encode_string(s)?;
        }
        Ok(())
    }
}

/// NDR decoder
pub struct NdrDecoder<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> NdrDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Get remaining bytes count
    pub fn remaining(&self) -> usize {
        self.cursor
            .get_ref()
            .len()
            .saturating_sub(self.cursor.position() as usize)
    }

    fn align(&mut self, alignment: u64) {
        let pos = self.cursor.position();
        let padding = (alignment - (pos % alignment)) % alignment;
        self.cursor.set_position(pos + padding);
    }

    fn short(&self, what: &str) -> Error {
        Error::ParseError(format!(
            "NDR stub truncated reading {} at offset {}",
            what,
            self.cursor.position()
        ))
    }

    pub fn decode_u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.short("u8"))
    }

    pub fn decode_u16(&mut self) -> Result<u16> {
        self.align(2);
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.short("u16"))
    }

    pub fn decode_u32(&mut self) -> Result<u32> {
        self.align(4);
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.short("u32"))
    }

    pub fn decode_u64(&mut self) -> Result<u64> {
        self.align(8);
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| self.short("u64"))
    }

    /// Read a pointer referent id; `false` means NULL
    pub fn decode_pointer(&mut self) -> Result<bool> {
        Ok(self.decode_u32()? != 0)
    }

    /// Conformant varying UTF-16 string, terminator stripped
    pub fn decode_string(&mut self) -> Result<String> {
        let max_count = self.decode_u32()?;
        let offset = self.decode_u32()?;
        let actual_count = self.decode_u32()?;
        if offset != 0 || actual_count > max_count {
            return Err(Error::ParseError(format!(
                "bad NDR string bounds: max {} offset {} actual {}",
                max_count, offset, actual_count
            )));
        }
        if actual_count as usize * 2 > self.remaining() {
            return Err(self.short("string"));
        }

        let mut utf16 = Vec::with_capacity(actual_count as usize);
        for _ in 0..actual_count {
            utf16.push(self.decode_u16()?);
        }
        let len = utf16.iter().position(|&c| c == 0).unwrap_or(utf16.len());
        String::from_utf16(&utf16[..len])
            .map_err(|e| Error::ParseError(format!("Invalid UTF-16: {}", e)))
    }

    /// `[unique, string]` pointer with its string inline
    pub fn decode_unique_string(&mut self) -> Result<Option<String>> {
        if self.decode_pointer()? {
            Ok(Some(self.decode_string()?))
        } else {
            Ok(None)
        }
    }
}
