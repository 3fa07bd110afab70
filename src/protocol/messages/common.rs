//! Common types and traits for SMB2 messages

use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{
    header_flags, structure_size, Smb2Command, COMPOUND_FILE_ID, SMB2_HEADER_SIZE, SMB2_MAGIC_U32,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

/// Trait for SMB messages that can be parsed from and serialized to bytes.
///
/// `parse` receives the body that follows the 64 byte header; offsets found in
/// the body are relative to the start of the header, as on the wire.
pub trait SmbMessage: Sized {
    /// Parse message from bytes
    fn parse(buf: &[u8]) -> Result<Self>;

    /// Serialize message to bytes
    fn serialize(&self) -> Result<Vec<u8>>;
}

/// SMB2 Header (64 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2Header {
    pub credit_charge: u16,
    pub status: u32,
    pub command: Smb2Command,
    /// Credit request (client) or credits granted (server)
    pub credits: u16,
    pub flags: u32,
    pub next_command: u32,
    pub message_id: u64,
    /// Process id (sync) or the high half of the async id
    pub reserved: u32,
    pub tree_id: u32,
    pub session_id: u64,
    pub signature: [u8; 16],
}

impl Smb2Header {
    pub fn new(command: Smb2Command) -> Self {
        Self {
            credit_charge: 0,
            status: 0,
            command,
            credits: 1,
            flags: 0,
            next_command: 0,
            message_id: 0,
            reserved: 0,
            tree_id: 0,
            session_id: 0,
            signature: [0; 16],
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < SMB2_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                need: SMB2_HEADER_SIZE,
                have: buf.len(),
            });
        }

        let mut cursor = io::Cursor::new(buf);
        let protocol_id = cursor.read_u32::<LittleEndian>()?;
        if protocol_id != SMB2_MAGIC_U32 {
            return Err(Error::ParseError(format!(
                "Invalid protocol ID: 0x{:08x}",
                protocol_id
            )));
        }

        let size = cursor.read_u16::<LittleEndian>()?;
        if size != structure_size::HEADER {
            return Err(Error::ParseError(format!(
                "Invalid header structure size: {}",
                size
            )));
        }

        let credit_charge = cursor.read_u16::<LittleEndian>()?;
        let status = cursor.read_u32::<LittleEndian>()?;
        let command = Smb2Command::try_from(cursor.read_u16::<LittleEndian>()?)?;
        let credits = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let next_command = cursor.read_u32::<LittleEndian>()?;
        let message_id = cursor.read_u64::<LittleEndian>()?;
        let reserved = cursor.read_u32::<LittleEndian>()?;
        let tree_id = cursor.read_u32::<LittleEndian>()?;
        let session_id = cursor.read_u64::<LittleEndian>()?;
        let mut signature = [0u8; 16];
        cursor.read_exact(&mut signature)?;

        Ok(Self {
            credit_charge,
            status,
            command,
            credits,
            flags,
            next_command,
            message_id,
            reserved,
            tree_id,
            session_id,
            signature,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(SMB2_HEADER_SIZE);
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u32::<LittleEndian>(SMB2_MAGIC_U32)?;
        buf.write_u16::<LittleEndian>(structure_size::HEADER)?;
        buf.write_u16::<LittleEndian>(self.credit_charge)?;
        buf.write_u32::<LittleEndian>(self.status)?;
        buf.write_u16::<LittleEndian>(self.command as u16)?;
        buf.write_u16::<LittleEndian>(self.credits)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u32::<LittleEndian>(self.next_command)?;
        buf.write_u64::<LittleEndian>(self.message_id)?;
        buf.write_u32::<LittleEndian>(self.reserved)?;
        buf.write_u32::<LittleEndian>(self.tree_id)?;
        buf.write_u64::<LittleEndian>(self.session_id)?;
        buf.extend_from_slice(&self.signature);
        Ok(())
    }

    pub fn is_response(&self) -> bool {
        self.flags & header_flags::RESPONSE != 0
    }

    pub fn is_async(&self) -> bool {
        self.flags & header_flags::ASYNC_COMMAND != 0
    }

    pub fn is_related(&self) -> bool {
        self.flags & header_flags::RELATED_OPERATIONS != 0
    }
}

/// File ID for SMB2 operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileId {
    pub persistent: u64,
    pub volatile: u64,
}

impl FileId {
    /// Placeholder id that makes a related compound member address the
    /// handle opened by the preceding CREATE
    pub const COMPOUND: FileId = FileId {
        persistent: COMPOUND_FILE_ID,
        volatile: COMPOUND_FILE_ID,
    };

    pub fn with_values(persistent: u64, volatile: u64) -> Self {
        Self {
            persistent,
            volatile,
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.persistent.to_le_bytes());
        bytes[8..].copy_from_slice(&self.volatile.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut persistent = [0u8; 8];
        let mut volatile = [0u8; 8];
        persistent.copy_from_slice(&bytes[..8]);
        volatile.copy_from_slice(&bytes[8..]);
        Self {
            persistent: u64::from_le_bytes(persistent),
            volatile: u64::from_le_bytes(volatile),
        }
    }

    pub(crate) fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            persistent: reader.read_u64::<LittleEndian>()?,
            volatile: reader.read_u64::<LittleEndian>()?,
        })
    }

    pub(crate) fn write_to(self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<LittleEndian>(self.persistent)?;
        buf.write_u64::<LittleEndian>(self.volatile)?;
        Ok(())
    }
}

/// SMB2 ERROR Response body, sent with any failing status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Smb2ErrorResponse {
    pub error_context_count: u8,
    pub error_data: Vec<u8>,
}

impl SmbMessage for Smb2ErrorResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        // Some servers truncate the error body; accept anything with a size field.
        if buf.len() < 2 {
            return Ok(Self::default());
        }
        let mut cursor = io::Cursor::new(buf);
        let _structure_size = cursor.read_u16::<LittleEndian>()?;
        if buf.len() < 8 {
            return Ok(Self::default());
        }
        let error_context_count = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let byte_count = cursor.read_u32::<LittleEndian>()? as usize;
        let end = (8 + byte_count).min(buf.len());
        Ok(Self {
            error_context_count,
            error_data: buf[8..end].to_vec(),
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(9);
        buf.write_u16::<LittleEndian>(structure_size::ERROR_RESPONSE)?;
        buf.write_u8(self.error_context_count)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.error_data.len() as u32)?;
        buf.extend_from_slice(&self.error_data);
        pad_to(&mut buf, 9);
        Ok(buf)
    }
}

/// Encode a string as UTF-16LE without terminator
pub fn utf16le_encode(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// Decode UTF-16LE bytes, dropping a trailing odd byte and replacing invalid units
pub fn utf16le_decode(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Slice a variable-length field whose offset is relative to the SMB2 header
/// out of a message body
pub fn header_relative<'a>(
    body: &'a [u8],
    offset: usize,
    length: usize,
    what: &str,
) -> Result<&'a [u8]> {
    if length == 0 {
        return Ok(&[]);
    }
    let start = offset.checked_sub(SMB2_HEADER_SIZE).ok_or_else(|| {
        Error::ParseError(format!("{} offset {} points into the header", what, offset))
    })?;
    let end = start + length;
    if end > body.len() {
        return Err(Error::ParseError(format!(
            "{} extends beyond message ({} > {})",
            what,
            end,
            body.len()
        )));
    }
    Ok(&body[start..end])
}

/// Fixed part of a body whose structure size counts one variable byte must
/// still be at least that long on the wire
pub fn pad_to(buf: &mut Vec<u8>, size: usize) {
    if buf.len() < size {
        buf.resize(size, 0);
    }
}

/// Check the leading StructureSize field of a body
pub(crate) fn expect_structure_size(
    cursor: &mut io::Cursor<&[u8]>,
    expected: u16,
    what: &str,
) -> Result<()> {
    let size = cursor.read_u16::<LittleEndian>()?;
    if size != expected {
        return Err(Error::ParseError(format!(
            "Invalid {} structure size: {}",
            what, size
        )));
    }
    Ok(())
}

/// Fail with `BufferTooSmall` unless `buf` holds at least `need` bytes
pub(crate) fn ensure_len(buf: &[u8], need: usize) -> Result<()> {
    if buf.len() < need {
        return Err(Error::BufferTooSmall {
            need,
            have: buf.len(),
        });
    }
    Ok(())
}
