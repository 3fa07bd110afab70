//! SMB2 File Operation messages (Create, Close, Flush, Read, Write)

use super::common::{
    ensure_len, expect_structure_size, header_relative, pad_to, utf16le_decode, utf16le_encode,
    FileId, SmbMessage,
};
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{
    impersonation_level, oplock_level, structure_size, CloseFlags, CreateDisposition,
    CreateOptions, DesiredAccess, FileAttributes, ShareAccess,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Name offset in a Create request (header + 56 fixed bytes)
const CREATE_NAME_OFFSET: u16 = 120;
/// Data offset in a Read response (header + 16 fixed bytes)
const READ_DATA_OFFSET: u8 = 80;
/// Data offset in a Write request (header + 48 fixed bytes)
const WRITE_DATA_OFFSET: u16 = 112;

/// SMB2 Create (Open) Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CreateRequest {
    pub requested_oplock_level: u8,
    pub impersonation_level: u32,
    pub desired_access: DesiredAccess,
    pub file_attributes: FileAttributes,
    pub share_access: ShareAccess,
    pub create_disposition: CreateDisposition,
    pub create_options: CreateOptions,
    /// Share-relative path with backslash separators
    pub file_name: String,
}

impl Smb2CreateRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            requested_oplock_level: oplock_level::NONE,
            impersonation_level: impersonation_level::IMPERSONATION,
            desired_access: DesiredAccess::FILE_GENERIC_READ,
            file_attributes: FileAttributes::empty(),
            share_access: ShareAccess::FILE_SHARE_READ | ShareAccess::FILE_SHARE_WRITE,
            create_disposition: CreateDisposition::Open,
            create_options: CreateOptions::empty(),
            file_name: file_name.into(),
        }
    }

    pub fn access(mut self, access: DesiredAccess) -> Self {
        self.desired_access = access;
        self
    }

    pub fn disposition(mut self, disposition: CreateDisposition) -> Self {
        self.create_disposition = disposition;
        self
    }

    pub fn options(mut self, options: CreateOptions) -> Self {
        self.create_options = options;
        self
    }

    pub fn share(mut self, share: ShareAccess) -> Self {
        self.share_access = share;
        self
    }
}

impl SmbMessage for Smb2CreateRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 56)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CREATE_REQUEST, "create request")?;

        let _security_flags = cursor.read_u8()?;
        let requested_oplock_level = cursor.read_u8()?;
        let impersonation_level = cursor.read_u32::<LittleEndian>()?;
        let _smb_create_flags = cursor.read_u64::<LittleEndian>()?;
        let _reserved = cursor.read_u64::<LittleEndian>()?;
        let desired_access = DesiredAccess::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let file_attributes = FileAttributes::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let share_access = ShareAccess::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let create_disposition = CreateDisposition::try_from(cursor.read_u32::<LittleEndian>()?)?;
        let create_options = CreateOptions::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let name_offset = cursor.read_u16::<LittleEndian>()?;
        let name_length = cursor.read_u16::<LittleEndian>()?;

        let file_name = utf16le_decode(header_relative(
            buf,
            name_offset as usize,
            name_length as usize,
            "create file name",
        )?);

        Ok(Self {
            requested_oplock_level,
            impersonation_level,
            desired_access,
            file_attributes,
            share_access,
            create_disposition,
            create_options,
            file_name,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let name = utf16le_encode(&self.file_name);
        let mut buf = Vec::with_capacity(56 + name.len().max(1));
        buf.write_u16::<LittleEndian>(structure_size::CREATE_REQUEST)?;
        buf.write_u8(0)?;
        buf.write_u8(self.requested_oplock_level)?;
        buf.write_u32::<LittleEndian>(self.impersonation_level)?;
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.desired_access.bits())?;
        buf.write_u32::<LittleEndian>(self.file_attributes.bits())?;
        buf.write_u32::<LittleEndian>(self.share_access.bits())?;
        buf.write_u32::<LittleEndian>(self.create_disposition as u32)?;
        buf.write_u32::<LittleEndian>(self.create_options.bits())?;
        buf.write_u16::<LittleEndian>(CREATE_NAME_OFFSET)?;
        buf.write_u16::<LittleEndian>(name.len() as u16)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&name);
        // An empty name still occupies the one variable byte.
        pad_to(&mut buf, 57);
        Ok(buf)
    }
}

/// Timestamps, sizes and attributes shared by Create and Close replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileTimes {
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub file_attributes: u32,
}

impl FileTimes {
    fn read(cursor: &mut io::Cursor<&[u8]>) -> Result<Self> {
        Ok(Self {
            creation_time: cursor.read_u64::<LittleEndian>()?,
            last_access_time: cursor.read_u64::<LittleEndian>()?,
            last_write_time: cursor.read_u64::<LittleEndian>()?,
            change_time: cursor.read_u64::<LittleEndian>()?,
            allocation_size: cursor.read_u64::<LittleEndian>()?,
            end_of_file: cursor.read_u64::<LittleEndian>()?,
            file_attributes: cursor.read_u32::<LittleEndian>()?,
        })
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u64::<LittleEndian>(self.creation_time)?;
        buf.write_u64::<LittleEndian>(self.last_access_time)?;
        buf.write_u64::<LittleEndian>(self.last_write_time)?;
        buf.write_u64::<LittleEndian>(self.change_time)?;
        buf.write_u64::<LittleEndian>(self.allocation_size)?;
        buf.write_u64::<LittleEndian>(self.end_of_file)?;
        buf.write_u32::<LittleEndian>(self.file_attributes)?;
        Ok(())
    }
}

/// SMB2 Create (Open) Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CreateResponse {
    pub oplock_level: u8,
    pub flags: u8,
    pub create_action: u32,
    pub times: FileTimes,
    pub file_id: FileId,
}

impl SmbMessage for Smb2CreateResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 88)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CREATE_RESPONSE, "create response")?;

        let oplock_level = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let create_action = cursor.read_u32::<LittleEndian>()?;
        let times = FileTimes::read(&mut cursor)?;
        let _reserved2 = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;

        Ok(Self {
            oplock_level,
            flags,
            create_action,
            times,
            file_id,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(89);
        buf.write_u16::<LittleEndian>(structure_size::CREATE_RESPONSE)?;
        buf.write_u8(self.oplock_level)?;
        buf.write_u8(self.flags)?;
        buf.write_u32::<LittleEndian>(self.create_action)?;
        self.times.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(0)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        pad_to(&mut buf, 89);
        Ok(buf)
    }
}

/// SMB2 Close Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CloseRequest {
    pub flags: CloseFlags,
    pub file_id: FileId,
}

impl Smb2CloseRequest {
    pub fn new(file_id: FileId) -> Self {
        Self {
            flags: CloseFlags::empty(),
            file_id,
        }
    }
}

impl SmbMessage for Smb2CloseRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 24)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CLOSE_REQUEST, "close request")?;
        let flags = CloseFlags::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        let _reserved = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        Ok(Self { flags, file_id })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(24);
        buf.write_u16::<LittleEndian>(structure_size::CLOSE_REQUEST)?;
        buf.write_u16::<LittleEndian>(self.flags.bits())?;
        buf.write_u32::<LittleEndian>(0)?;
        self.file_id.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// SMB2 Close Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2CloseResponse {
    pub flags: CloseFlags,
    pub times: FileTimes,
}

impl SmbMessage for Smb2CloseResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 60)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::CLOSE_RESPONSE, "close response")?;
        let flags = CloseFlags::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        let _reserved = cursor.read_u32::<LittleEndian>()?;
        let times = FileTimes::read(&mut cursor)?;
        Ok(Self { flags, times })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(60);
        buf.write_u16::<LittleEndian>(structure_size::CLOSE_RESPONSE)?;
        buf.write_u16::<LittleEndian>(self.flags.bits())?;
        buf.write_u32::<LittleEndian>(0)?;
        self.times.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// SMB2 Flush Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2FlushRequest {
    pub file_id: FileId,
}

impl SmbMessage for Smb2FlushRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 24)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::FLUSH_REQUEST, "flush request")?;
        let _reserved1 = cursor.read_u16::<LittleEndian>()?;
        let _reserved2 = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            file_id: FileId::read(&mut cursor)?,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(24);
        buf.write_u16::<LittleEndian>(structure_size::FLUSH_REQUEST)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        self.file_id.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// SMB2 Read Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2ReadRequest {
    pub length: u32,
    pub offset: u64,
    pub file_id: FileId,
    pub minimum_count: u32,
}

impl Smb2ReadRequest {
    pub fn new(file_id: FileId, offset: u64, length: u32) -> Self {
        Self {
            length,
            offset,
            file_id,
            minimum_count: 0,
        }
    }
}

impl SmbMessage for Smb2ReadRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 48)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::READ_REQUEST, "read request")?;
        let _padding = cursor.read_u8()?;
        let _flags = cursor.read_u8()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u64::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let minimum_count = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            length,
            offset,
            file_id,
            minimum_count,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(49);
        buf.write_u16::<LittleEndian>(structure_size::READ_REQUEST)?;
        buf.write_u8(READ_DATA_OFFSET)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.length)?;
        buf.write_u64::<LittleEndian>(self.offset)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(self.minimum_count)?;
        buf.write_u32::<LittleEndian>(0)?; // channel
        buf.write_u32::<LittleEndian>(0)?; // remaining bytes
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        pad_to(&mut buf, 49);
        Ok(buf)
    }
}

/// SMB2 Read Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2ReadResponse {
    pub data_remaining: u32,
    pub data: Vec<u8>,
}

impl SmbMessage for Smb2ReadResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 16)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::READ_RESPONSE, "read response")?;
        let data_offset = cursor.read_u8()?;
        let _reserved = cursor.read_u8()?;
        let data_length = cursor.read_u32::<LittleEndian>()?;
        let data_remaining = cursor.read_u32::<LittleEndian>()?;
        let data =
            header_relative(buf, data_offset as usize, data_length as usize, "read data")?.to_vec();
        Ok(Self {
            data_remaining,
            data,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16 + self.data.len());
        buf.write_u16::<LittleEndian>(structure_size::READ_RESPONSE)?;
        buf.write_u8(READ_DATA_OFFSET)?;
        buf.write_u8(0)?;
        buf.write_u32::<LittleEndian>(self.data.len() as u32)?;
        buf.write_u32::<LittleEndian>(self.data_remaining)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.data);
        pad_to(&mut buf, 17);
        Ok(buf)
    }
}

/// SMB2 Write Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2WriteRequest {
    pub offset: u64,
    pub file_id: FileId,
    pub flags: u32,
    pub data: Vec<u8>,
}

impl Smb2WriteRequest {
    pub fn new(file_id: FileId, offset: u64, data: Vec<u8>) -> Self {
        Self {
            offset,
            file_id,
            flags: 0,
            data,
        }
    }
}

impl SmbMessage for Smb2WriteRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 48)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::WRITE_REQUEST, "write request")?;
        let data_offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u64::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let _channel = cursor.read_u32::<LittleEndian>()?;
        let _remaining = cursor.read_u32::<LittleEndian>()?;
        let _channel_info_offset = cursor.read_u16::<LittleEndian>()?;
        let _channel_info_length = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let data = header_relative(buf, data_offset as usize, length as usize, "write data")?.to_vec();
        Ok(Self {
            offset,
            file_id,
            flags,
            data,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let length = u32::try_from(self.data.len())
            .map_err(|_| Error::InvalidParameter("write larger than 4GiB".into()))?;
        let mut buf = Vec::with_capacity(48 + self.data.len());
        buf.write_u16::<LittleEndian>(structure_size::WRITE_REQUEST)?;
        buf.write_u16::<LittleEndian>(WRITE_DATA_OFFSET)?;
        buf.write_u32::<LittleEndian>(length)?;
        buf.write_u64::<LittleEndian>(self.offset)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.extend_from_slice(&self.data);
        pad_to(&mut buf, 49);
        Ok(buf)
    }
}

/// SMB2 Write Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2WriteResponse {
    pub count: u32,
    pub remaining: u32,
}

impl SmbMessage for Smb2WriteResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 16)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::WRITE_RESPONSE, "write response")?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let count = cursor.read_u32::<LittleEndian>()?;
        let remaining = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { count, remaining })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(17);
        buf.write_u16::<LittleEndian>(structure_size::WRITE_RESPONSE)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.count)?;
        buf.write_u32::<LittleEndian>(self.remaining)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u16::<LittleEndian>(0)?;
        pad_to(&mut buf, 17);
        Ok(buf)
    }
}
