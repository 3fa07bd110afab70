//! SMB2 Directory operations messages

use super::common::{
    ensure_len, expect_structure_size, header_relative, pad_to, utf16le_decode, utf16le_encode,
    FileId, SmbMessage,
};
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{info_class, structure_size};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Search pattern offset in a QueryDirectory request (header + 32 fixed bytes)
const PATTERN_OFFSET: u16 = 96;
/// Output buffer offset in a QueryDirectory response (header + 8 fixed bytes)
const OUTPUT_OFFSET: u16 = 72;
/// Fixed part of a FileIdFullDirectoryInformation entry
const FULL_DIR_ENTRY_FIXED: usize = 80;

/// SMB2 QUERY_DIRECTORY Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2QueryDirectoryRequest {
    pub file_information_class: u8,
    pub flags: u8,
    pub file_index: u32,
    pub file_id: FileId,
    pub output_buffer_length: u32,
    /// Search pattern, `*` for everything
    pub pattern: String,
}

impl Smb2QueryDirectoryRequest {
    pub fn new(file_id: FileId, output_buffer_length: u32) -> Self {
        Self {
            file_information_class: info_class::FILE_ID_FULL_DIRECTORY_INFORMATION,
            flags: 0,
            file_index: 0,
            file_id,
            output_buffer_length,
            pattern: "*".to_string(),
        }
    }
}

impl SmbMessage for Smb2QueryDirectoryRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 32)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::QUERY_DIRECTORY_REQUEST,
            "query directory request",
        )?;

        let file_information_class = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let file_index = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let pattern_offset = cursor.read_u16::<LittleEndian>()?;
        let pattern_length = cursor.read_u16::<LittleEndian>()?;
        let output_buffer_length = cursor.read_u32::<LittleEndian>()?;
        let pattern = utf16le_decode(header_relative(
            buf,
            pattern_offset as usize,
            pattern_length as usize,
            "search pattern",
        )?);

        Ok(Self {
            file_information_class,
            flags,
            file_index,
            file_id,
            output_buffer_length,
            pattern,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let pattern = utf16le_encode(&self.pattern);
        let mut buf = Vec::with_capacity(32 + pattern.len());
        buf.write_u16::<LittleEndian>(structure_size::QUERY_DIRECTORY_REQUEST)?;
        buf.write_u8(self.file_information_class)?;
        buf.write_u8(self.flags)?;
        buf.write_u32::<LittleEndian>(self.file_index)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u16::<LittleEndian>(PATTERN_OFFSET)?;
        buf.write_u16::<LittleEndian>(pattern.len() as u16)?;
        buf.write_u32::<LittleEndian>(self.output_buffer_length)?;
        buf.extend_from_slice(&pattern);
        pad_to(&mut buf, 33);
        Ok(buf)
    }
}

/// SMB2 QUERY_DIRECTORY Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2QueryDirectoryResponse {
    pub output_buffer: Vec<u8>,
}

impl Smb2QueryDirectoryResponse {
    /// Decode the output buffer as FileIdFullDirectoryInformation entries
    pub fn entries(&self) -> Result<Vec<DirectoryEntry>> {
        DirectoryEntry::parse_list(&self.output_buffer)
    }
}

impl SmbMessage for Smb2QueryDirectoryResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 8)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(
            &mut cursor,
            structure_size::QUERY_DIRECTORY_RESPONSE,
            "query directory response",
        )?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let output_buffer =
            header_relative(buf, offset as usize, length as usize, "directory output")?.to_vec();
        Ok(Self { output_buffer })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(8 + self.output_buffer.len());
        buf.write_u16::<LittleEndian>(structure_size::QUERY_DIRECTORY_RESPONSE)?;
        buf.write_u16::<LittleEndian>(OUTPUT_OFFSET)?;
        buf.write_u32::<LittleEndian>(self.output_buffer.len() as u32)?;
        buf.extend_from_slice(&self.output_buffer);
        pad_to(&mut buf, 9);
        Ok(buf)
    }
}

/// One FileIdFullDirectoryInformation record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub file_index: u32,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub change_time: u64,
    pub end_of_file: u64,
    pub allocation_size: u64,
    pub file_attributes: u32,
    pub ea_size: u32,
    pub file_id: u64,
    pub name: String,
}

impl DirectoryEntry {
    /// Walk a chain of entries linked by NextEntryOffset
    pub fn parse_list(buf: &[u8]) -> Result<Vec<Self>> {
        let mut entries = Vec::new();
        let mut pos = 0usize;

        while pos < buf.len() {
            let record = &buf[pos..];
            ensure_len(record, FULL_DIR_ENTRY_FIXED)?;
            let mut cursor = io::Cursor::new(record);

            let next_entry_offset = cursor.read_u32::<LittleEndian>()? as usize;
            let file_index = cursor.read_u32::<LittleEndian>()?;
            let creation_time = cursor.read_u64::<LittleEndian>()?;
            let last_access_time = cursor.read_u64::<LittleEndian>()?;
            let last_write_time = cursor.read_u64::<LittleEndian>()?;
            let change_time = cursor.read_u64::<LittleEndian>()?;
            let end_of_file = cursor.read_u64::<LittleEndian>()?;
            let allocation_size = cursor.read_u64::<LittleEndian>()?;
            let file_attributes = cursor.read_u32::<LittleEndian>()?;
            let name_length = cursor.read_u32::<LittleEndian>()? as usize;
            let ea_size = cursor.read_u32::<LittleEndian>()?;
            let _reserved = cursor.read_u32::<LittleEndian>()?;
            let file_id = cursor.read_u64::<LittleEndian>()?;

            let name_end = FULL_DIR_ENTRY_FIXED + name_length;
            if name_end > record.len() {
                return Err(Error::ParseError(format!(
                    "directory entry name extends beyond buffer ({} > {})",
                    name_end,
                    record.len()
                )));
            }
            let name = utf16le_decode(&record[FULL_DIR_ENTRY_FIXED..name_end]);

            entries.push(Self {
                file_index,
                creation_time,
                last_access_time,
                last_write_time,
                change_time,
                end_of_file,
                allocation_size,
                file_attributes,
                ea_size,
                file_id,
                name,
            });

            if next_entry_offset == 0 {
                break;
            }
            pos += next_entry_offset;
        }

        Ok(entries)
    }

    /// Encode entries back to back, each aligned to 8 bytes
    pub fn encode_list(entries: &[Self]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let name = utf16le_encode(&entry.name);
            let len = FULL_DIR_ENTRY_FIXED + name.len();
            let next = if i + 1 == entries.len() {
                0
            } else {
                (len + 7) & !7
            };

            let start = buf.len();
            buf.write_u32::<LittleEndian>(next as u32)?;
            buf.write_u32::<LittleEndian>(entry.file_index)?;
            buf.write_u64::<LittleEndian>(entry.creation_time)?;
            buf.write_u64::<LittleEndian>(entry.last_access_time)?;
            buf.write_u64::<LittleEndian>(entry.last_write_time)?;
            buf.write_u64::<LittleEndian>(entry.change_time)?;
            buf.write_u64::<LittleEndian>(entry.end_of_file)?;
            buf.write_u64::<LittleEndian>(entry.allocation_size)?;
            buf.write_u32::<LittleEndian>(entry.file_attributes)?;
            buf.write_u32::<LittleEndian>(name.len() as u32)?;
            buf.write_u32::<LittleEndian>(entry.ea_size)?;
            buf.write_u32::<LittleEndian>(0)?;
            buf.write_u64::<LittleEndian>(entry.file_id)?;
            buf.extend_from_slice(&name);
            if next != 0 {
                buf.resize(start + next, 0);
            }
        }
        Ok(buf)
    }
}
