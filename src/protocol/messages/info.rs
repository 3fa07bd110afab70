//! SMB2 QUERY_INFO / SET_INFO messages and the information classes the
//! client reads and writes through them

use super::common::{
    ensure_len, expect_structure_size, header_relative, pad_to, utf16le_decode, utf16le_encode,
    FileId, SmbMessage,
};
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{info_class, info_type, structure_size};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Input buffer offset in a QueryInfo request (header + 40 fixed bytes)
const QUERY_INPUT_OFFSET: u16 = 104;
/// Output buffer offset in a QueryInfo response (header + 8 fixed bytes)
const QUERY_OUTPUT_OFFSET: u16 = 72;
/// Buffer offset in a SetInfo request (header + 32 fixed bytes)
const SET_BUFFER_OFFSET: u16 = 96;

/// SMB2 QUERY_INFO Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2QueryInfoRequest {
    pub info_type: u8,
    pub file_info_class: u8,
    pub output_buffer_length: u32,
    pub additional_information: u32,
    pub flags: u32,
    pub file_id: FileId,
    pub input_buffer: Vec<u8>,
}

impl Smb2QueryInfoRequest {
    pub fn new(info_type: u8, file_info_class: u8, file_id: FileId, output_len: u32) -> Self {
        Self {
            info_type,
            file_info_class,
            output_buffer_length: output_len,
            additional_information: 0,
            flags: 0,
            file_id,
            input_buffer: Vec::new(),
        }
    }

    /// FileAllInformation for one file
    pub fn all_information(file_id: FileId, output_len: u32) -> Self {
        Self::new(
            info_type::FILE,
            info_class::FILE_ALL_INFORMATION,
            file_id,
            output_len,
        )
    }

    /// FileFsFullSizeInformation for the volume holding a file
    pub fn fs_full_size(file_id: FileId, output_len: u32) -> Self {
        Self::new(
            info_type::FILESYSTEM,
            info_class::FILE_FS_FULL_SIZE_INFORMATION,
            file_id,
            output_len,
        )
    }
}

impl SmbMessage for Smb2QueryInfoRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 40)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::QUERY_INFO_REQUEST, "query info request")?;

        let info_type = cursor.read_u8()?;
        let file_info_class = cursor.read_u8()?;
        let output_buffer_length = cursor.read_u32::<LittleEndian>()?;
        let input_offset = cursor.read_u16::<LittleEndian>()?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let input_length = cursor.read_u32::<LittleEndian>()?;
        let additional_information = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let input_buffer =
            header_relative(buf, input_offset as usize, input_length as usize, "query info input")?
                .to_vec();

        Ok(Self {
            info_type,
            file_info_class,
            output_buffer_length,
            additional_information,
            flags,
            file_id,
            input_buffer,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(40 + self.input_buffer.len().max(1));
        buf.write_u16::<LittleEndian>(structure_size::QUERY_INFO_REQUEST)?;
        buf.write_u8(self.info_type)?;
        buf.write_u8(self.file_info_class)?;
        buf.write_u32::<LittleEndian>(self.output_buffer_length)?;
        let offset = if self.input_buffer.is_empty() { 0 } else { QUERY_INPUT_OFFSET };
        buf.write_u16::<LittleEndian>(offset)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.input_buffer.len() as u32)?;
        buf.write_u32::<LittleEndian>(self.additional_information)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        self.file_id.write_to(&mut buf)?;
        buf.extend_from_slice(&self.input_buffer);
        pad_to(&mut buf, 41);
        Ok(buf)
    }
}

/// SMB2 QUERY_INFO Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2QueryInfoResponse {
    pub output_buffer: Vec<u8>,
}

impl SmbMessage for Smb2QueryInfoResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::QUERY_INFO_RESPONSE, "query info response")?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let output_buffer =
            header_relative(buf, offset as usize, length as usize, "query info output")?.to_vec();
        Ok(Self { output_buffer })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + self.output_buffer.len());
        buf.write_u16::<LittleEndian>(structure_size::QUERY_INFO_RESPONSE)?;
        buf.write_u16::<LittleEndian>(QUERY_OUTPUT_OFFSET)?;
        buf.write_u32::<LittleEndian>(self.output_buffer.len() as u32)?;
        buf.extend_from_slice(&self.output_buffer);
        pad_to(&mut buf, 9);
        Ok(buf)
    }
}

/// SMB2 SET_INFO Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2SetInfoRequest {
    pub info_type: u8,
    pub file_info_class: u8,
    pub additional_information: u32,
    pub file_id: FileId,
    pub buffer: Vec<u8>,
}

impl Smb2SetInfoRequest {
    pub fn new(file_info_class: u8, file_id: FileId, buffer: Vec<u8>) -> Self {
        Self {
            info_type: info_type::FILE,
            file_info_class,
            additional_information: 0,
            file_id,
            buffer,
        }
    }

    pub fn end_of_file(file_id: FileId, length: u64) -> Self {
        Self::new(
            info_class::FILE_END_OF_FILE_INFORMATION,
            file_id,
            length.to_le_bytes().to_vec(),
        )
    }

    pub fn disposition(file_id: FileId, delete_pending: bool) -> Self {
        Self::new(
            info_class::FILE_DISPOSITION_INFORMATION,
            file_id,
            vec![delete_pending as u8],
        )
    }

    pub fn rename(file_id: FileId, info: &RenameInformation) -> Result<Self> {
        Ok(Self::new(
            info_class::FILE_RENAME_INFORMATION,
            file_id,
            info.encode()?,
        ))
    }
}

impl SmbMessage for Smb2SetInfoRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 32)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::SET_INFO_REQUEST, "set info request")?;

        let info_type = cursor.read_u8()?;
        let file_info_class = cursor.read_u8()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let additional_information = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let buffer = header_relative(buf, offset as usize, length as usize, "set info buffer")?.to_vec();

        Ok(Self {
            info_type,
            file_info_class,
            additional_information,
            file_id,
            buffer,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(32 + self.buffer.len());
        buf.write_u16::<LittleEndian>(structure_size::SET_INFO_REQUEST)?;
        buf.write_u8(self.info_type)?;
        buf.write_u8(self.file_info_class)?;
        buf.write_u32::<LittleEndian>(self.buffer.len() as u32)?;
        buf.write_u16::<LittleEndian>(SET_BUFFER_OFFSET)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.additional_information)?;
        self.file_id.write_to(&mut buf)?;
        buf.extend_from_slice(&self.buffer);
        pad_to(&mut buf, 33);
        Ok(buf)
    }
}

/// SMB2 SET_INFO Response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Smb2SetInfoResponse;

impl SmbMessage for Smb2SetInfoResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 2)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::SET_INFO_RESPONSE, "set info response")?;
        Ok(Self)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(structure_size::SET_INFO_RESPONSE.to_le_bytes().to_vec())
    }
}

/// FileAllInformation (MS-FSCC 2.4.2), fields the client uses plus the name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileAllInformation {
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub file_attributes: u32,
    pub allocation_size: u64,
    pub end_of_file: u64,
    pub number_of_links: u32,
    pub delete_pending: bool,
    pub directory: bool,
    pub index_number: u64,
    pub ea_size: u32,
    pub access_flags: u32,
    pub current_byte_offset: u64,
    pub mode: u32,
    pub alignment_requirement: u32,
    pub name: String,
}

impl FileAllInformation {
    const FIXED: usize = 100;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, Self::FIXED)?;
        let mut cursor = io::Cursor::new(buf);

        // FileBasicInformation
        let creation_time = cursor.read_u64::<LittleEndian>()?;
        let last_access_time = cursor.read_u64::<LittleEndian>()?;
        let last_write_time = cursor.read_u64::<LittleEndian>()?;
        let change_time = cursor.read_u64::<LittleEndian>()?;
        let file_attributes = cursor.read_u32::<LittleEndian>()?;
        let _reserved = cursor.read_u32::<LittleEndian>()?;

        // FileStandardInformation
        let allocation_size = cursor.read_u64::<LittleEndian>()?;
        let end_of_file = cursor.read_u64::<LittleEndian>()?;
        let number_of_links = cursor.read_u32::<LittleEndian>()?;
        let delete_pending = cursor.read_u8()? != 0;
        let directory = cursor.read_u8()? != 0;
        let _reserved = cursor.read_u16::<LittleEndian>()?;

        let index_number = cursor.read_u64::<LittleEndian>()?;
        let ea_size = cursor.read_u32::<LittleEndian>()?;
        let access_flags = cursor.read_u32::<LittleEndian>()?;
        let current_byte_offset = cursor.read_u64::<LittleEndian>()?;
        let mode = cursor.read_u32::<LittleEndian>()?;
        let alignment_requirement = cursor.read_u32::<LittleEndian>()?;

        // Servers may truncate the name to fit the output buffer.
        let name_length = cursor.read_u32::<LittleEndian>()? as usize;
        let end = (Self::FIXED + name_length).min(buf.len());
        let name = utf16le_decode(&buf[Self::FIXED..end]);

        Ok(Self {
            creation_time,
            last_access_time,
            last_write_time,
            change_time,
            file_attributes,
            allocation_size,
            end_of_file,
            number_of_links,
            delete_pending,
            directory,
            index_number,
            ea_size,
            access_flags,
            current_byte_offset,
            mode,
            alignment_requirement,
            name,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let name = utf16le_encode(&self.name);
        let mut buf = Vec::with_capacity(Self::FIXED + name.len());
        buf.write_u64::<LittleEndian>(self.creation_time)?;
        buf.write_u64::<LittleEndian>(self.last_access_time)?;
        buf.write_u64::<LittleEndian>(self.last_write_time)?;
        buf.write_u64::<LittleEndian>(self.change_time)?;
        buf.write_u32::<LittleEndian>(self.file_attributes)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u64::<LittleEndian>(self.allocation_size)?;
        buf.write_u64::<LittleEndian>(self.end_of_file)?;
        buf.write_u32::<LittleEndian>(self.number_of_links)?;
        buf.write_u8(self.delete_pending as u8)?;
        buf.write_u8(self.directory as u8)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u64::<LittleEndian>(self.index_number)?;
        buf.write_u32::<LittleEndian>(self.ea_size)?;
        buf.write_u32::<LittleEndian>(self.access_flags)?;
        buf.write_u64::<LittleEndian>(self.current_byte_offset)?;
        buf.write_u32::<LittleEndian>(self.mode)?;
        buf.write_u32::<LittleEndian>(self.alignment_requirement)?;
        buf.write_u32::<LittleEndian>(name.len() as u32)?;
        buf.extend_from_slice(&name);
        Ok(buf)
    }
}

/// FileFsFullSizeInformation (MS-FSCC 2.5.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FsFullSizeInformation {
    pub total_allocation_units: u64,
    pub caller_available_allocation_units: u64,
    pub actual_available_allocation_units: u64,
    pub sectors_per_allocation_unit: u32,
    pub bytes_per_sector: u32,
}

impl FsFullSizeInformation {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 32)?;
        let mut cursor = io::Cursor::new(buf);
        Ok(Self {
            total_allocation_units: cursor.read_u64::<LittleEndian>()?,
            caller_available_allocation_units: cursor.read_u64::<LittleEndian>()?,
            actual_available_allocation_units: cursor.read_u64::<LittleEndian>()?,
            sectors_per_allocation_unit: cursor.read_u32::<LittleEndian>()?,
            bytes_per_sector: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(32);
        buf.write_u64::<LittleEndian>(self.total_allocation_units)?;
        buf.write_u64::<LittleEndian>(self.caller_available_allocation_units)?;
        buf.write_u64::<LittleEndian>(self.actual_available_allocation_units)?;
        buf.write_u32::<LittleEndian>(self.sectors_per_allocation_unit)?;
        buf.write_u32::<LittleEndian>(self.bytes_per_sector)?;
        Ok(buf)
    }
}

/// FileRenameInformation, SMB2 flavour with a 64-bit root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameInformation {
    pub replace_if_exists: bool,
    /// Share-relative target with backslash separators
    pub file_name: String,
}

impl RenameInformation {
    const FIXED: usize = 20;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, Self::FIXED)?;
        let mut cursor = io::Cursor::new(buf);
        let replace_if_exists = cursor.read_u8()? != 0;
        cursor.set_position(8);
        let _root_directory = cursor.read_u64::<LittleEndian>()?;
        let name_length = cursor.read_u32::<LittleEndian>()? as usize;
        let end = Self::FIXED + name_length;
        if end > buf.len() {
            return Err(Error::ParseError(format!(
                "rename target extends beyond buffer ({} > {})",
                end,
                buf.len()
            )));
        }
        Ok(Self {
            replace_if_exists,
            file_name: utf16le_decode(&buf[Self::FIXED..end]),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let name = utf16le_encode(&self.file_name);
        let mut buf = Vec::with_capacity(Self::FIXED + name.len());
        buf.write_u8(self.replace_if_exists as u8)?;
        buf.extend_from_slice(&[0u8; 7]);
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(name.len() as u32)?;
        buf.extend_from_slice(&name);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_info_request_fixture() {
        let req = Smb2QueryInfoRequest::all_information(FileId::COMPOUND, 4096);
        let bytes = req.serialize().unwrap();

        assert_eq!(bytes.len(), 41);
        assert_eq!(&bytes[0..4], &[41, 0, 1, 0x12]);
        assert_eq!(&bytes[4..8], &4096u32.to_le_bytes());
        assert_eq!(&bytes[8..10], &[0, 0]);
        assert!(bytes[24..40].iter().all(|b| *b == 0xFF));
        assert_eq!(Smb2QueryInfoRequest::parse(&bytes).unwrap(), req);
    }

    #[test]
    fn test_set_info_end_of_file_fixture() {
        let req = Smb2SetInfoRequest::end_of_file(FileId::with_values(1, 2), 0x1000);
        let bytes = req.serialize().unwrap();

        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], &[33, 0, 1, 0x14]);
        assert_eq!(&bytes[4..8], &[8, 0, 0, 0]);
        assert_eq!(&bytes[8..10], &[96, 0]);
        assert_eq!(&bytes[32..40], &0x1000u64.to_le_bytes());
        assert_eq!(Smb2SetInfoRequest::parse(&bytes).unwrap(), req);
    }

    #[test]
    fn test_set_info_response_fixture() {
        assert_eq!(Smb2SetInfoResponse.serialize().unwrap(), vec![2, 0]);
        assert!(Smb2SetInfoResponse::parse(&[2, 0]).is_ok());
    }

    #[test]
    fn test_file_all_information_fixture() {
        let mut buf = vec![0u8; 100];
        buf[16..24].copy_from_slice(&0x01D0_0000_0000_0000u64.to_le_bytes());
        buf[32..36].copy_from_slice(&0x10u32.to_le_bytes());
        buf[48..56].copy_from_slice(&1234u64.to_le_bytes());
        buf[56..60].copy_from_slice(&1u32.to_le_bytes());
        buf[61] = 1;
        buf[96..100].copy_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&[b'x', 0]);

        let info = FileAllInformation::parse(&buf).unwrap();
        assert_eq!(info.last_write_time, 0x01D0_0000_0000_0000);
        assert_eq!(info.file_attributes, 0x10);
        assert_eq!(info.end_of_file, 1234);
        assert_eq!(info.number_of_links, 1);
        assert!(info.directory);
        assert_eq!(info.name, "x");
        assert_eq!(info.encode().unwrap(), buf);
    }

    #[test]
    fn test_fs_full_size_fixture() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u64.to_le_bytes());
        buf.extend_from_slice(&40u64.to_le_bytes());
        buf.extend_from_slice(&50u64.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&512u32.to_le_bytes());

        let info = FsFullSizeInformation::parse(&buf).unwrap();
        assert_eq!(info.total_allocation_units, 100);
        assert_eq!(info.caller_available_allocation_units, 40);
        assert_eq!(info.bytes_per_sector, 512);
        assert_eq!(info.encode().unwrap(), buf);
    }

    #[test]
    fn test_rename_information_fixture() {
        let info = RenameInformation {
            replace_if_exists: false,
            file_name: "a\\b".into(),
        };
        let bytes = info.encode().unwrap();
        assert_eq!(bytes.len(), 26);
        assert_eq!(&bytes[16..20], &[6, 0, 0, 0]);
        assert_eq!(RenameInformation::parse(&bytes).unwrap(), info);
    }
}
