//! SMB2 Session Setup and Logoff messages

use super::common::{ensure_len, expect_structure_size, header_relative, pad_to, SmbMessage};
use crate::error::Result;
use crate::protocol::smb2_constants::{structure_size, SecurityMode, SessionFlags};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Security buffer offset in a SessionSetup request (header + 24 fixed bytes)
const REQUEST_BUFFER_OFFSET: u16 = 88;
/// Security buffer offset in a SessionSetup response (header + 8 fixed bytes)
const RESPONSE_BUFFER_OFFSET: u16 = 72;

/// SMB2 Session Setup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SessionSetupRequest {
    pub flags: u8,
    pub security_mode: SecurityMode,
    pub capabilities: u32,
    pub previous_session_id: u64,
    pub security_blob: Vec<u8>,
}

impl Smb2SessionSetupRequest {
    pub fn new(security_blob: Vec<u8>) -> Self {
        Self {
            flags: 0,
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: 0,
            previous_session_id: 0,
            security_blob,
        }
    }
}

impl SmbMessage for Smb2SessionSetupRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 24)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::SESSION_SETUP_REQUEST, "session setup request")?;

        let flags = cursor.read_u8()?;
        let security_mode = SecurityMode::from_bits_retain(cursor.read_u8()? as u16);
        let capabilities = cursor.read_u32::<LittleEndian>()?;
        let _channel = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u16::<LittleEndian>()?;
        let previous_session_id = cursor.read_u64::<LittleEndian>()?;

        let security_blob =
            header_relative(buf, offset as usize, length as usize, "session setup security buffer")?
                .to_vec();

        Ok(Self {
            flags,
            security_mode,
            capabilities,
            previous_session_id,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(24 + self.security_blob.len());
        buf.write_u16::<LittleEndian>(structure_size::SESSION_SETUP_REQUEST)?;
        buf.write_u8(self.flags)?;
        buf.write_u8(self.security_mode.bits() as u8)?;
        buf.write_u32::<LittleEndian>(self.capabilities)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(REQUEST_BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(self.security_blob.len() as u16)?;
        buf.write_u64::<LittleEndian>(self.previous_session_id)?;
        buf.extend_from_slice(&self.security_blob);
        pad_to(&mut buf, 25);
        Ok(buf)
    }
}

/// SMB2 Session Setup Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SessionSetupResponse {
    pub session_flags: SessionFlags,
    pub security_blob: Vec<u8>,
}

impl SmbMessage for Smb2SessionSetupResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::SESSION_SETUP_RESPONSE, "session setup response")?;

        let session_flags = SessionFlags::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        let offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u16::<LittleEndian>()?;
        let security_blob =
            header_relative(buf, offset as usize, length as usize, "session setup security buffer")?
                .to_vec();

        Ok(Self {
            session_flags,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + self.security_blob.len());
        buf.write_u16::<LittleEndian>(structure_size::SESSION_SETUP_RESPONSE)?;
        buf.write_u16::<LittleEndian>(self.session_flags.bits())?;
        buf.write_u16::<LittleEndian>(RESPONSE_BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(self.security_blob.len() as u16)?;
        buf.extend_from_slice(&self.security_blob);
        pad_to(&mut buf, 9);
        Ok(buf)
    }
}

/// Four byte body shared by LOGOFF, TREE_DISCONNECT, ECHO and FLUSH replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Smb2EmptyBody;

impl SmbMessage for Smb2EmptyBody {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 4)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, 4, "empty body")?;
        Ok(Self)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(vec![4, 0, 0, 0])
    }
}
