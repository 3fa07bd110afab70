//! SMB2 Tree Connect messages

use super::common::{
    ensure_len, expect_structure_size, header_relative, pad_to, utf16le_decode, utf16le_encode,
    SmbMessage,
};
use crate::error::Result;
use crate::protocol::smb2_constants::structure_size;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Path offset in a TreeConnect request (header + 8 fixed bytes)
const PATH_OFFSET: u16 = 72;

/// SMB2 Tree Connect Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2TreeConnectRequest {
    pub flags: u16,
    /// UNC path of the share, e.g. `\\server\share`
    pub path: String,
}

impl Smb2TreeConnectRequest {
    pub fn new(path: String) -> Self {
        Self { flags: 0, path }
    }

    pub fn for_share(server: &str, share: &str) -> Self {
        Self::new(format!("\\\\{}\\{}", server, share))
    }
}

impl SmbMessage for Smb2TreeConnectRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::TREE_CONNECT_REQUEST, "tree connect request")?;

        let flags = cursor.read_u16::<LittleEndian>()?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u16::<LittleEndian>()?;
        let path = utf16le_decode(header_relative(
            buf,
            offset as usize,
            length as usize,
            "tree connect path",
        )?);

        Ok(Self { flags, path })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let path = utf16le_encode(&self.path);
        let mut buf = Vec::with_capacity(8 + path.len());
        buf.write_u16::<LittleEndian>(structure_size::TREE_CONNECT_REQUEST)?;
        buf.write_u16::<LittleEndian>(self.flags)?;
        buf.write_u16::<LittleEndian>(PATH_OFFSET)?;
        buf.write_u16::<LittleEndian>(path.len() as u16)?;
        buf.extend_from_slice(&path);
        pad_to(&mut buf, 9);
        Ok(buf)
    }
}

/// SMB2 Tree Connect Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2TreeConnectResponse {
    pub share_type: u8,
    pub share_flags: u32,
    pub capabilities: u32,
    pub maximal_access: u32,
}

impl SmbMessage for Smb2TreeConnectResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 16)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::TREE_CONNECT_RESPONSE, "tree connect response")?;

        let share_type = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        Ok(Self {
            share_type,
            share_flags: cursor.read_u32::<LittleEndian>()?,
            capabilities: cursor.read_u32::<LittleEndian>()?,
            maximal_access: cursor.read_u32::<LittleEndian>()?,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16);
        buf.write_u16::<LittleEndian>(structure_size::TREE_CONNECT_RESPONSE)?;
        buf.write_u8(self.share_type)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.share_flags)?;
        buf.write_u32::<LittleEndian>(self.capabilities)?;
        buf.write_u32::<LittleEndian>(self.maximal_access)?;
        Ok(buf)
    }
}
