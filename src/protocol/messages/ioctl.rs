//! SMB2 IOCTL messages

use super::common::{ensure_len, expect_structure_size, header_relative, pad_to, FileId, SmbMessage};
use crate::error::Result;
use crate::protocol::smb2_constants::{fsctl, structure_size};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;

/// Input offset in an Ioctl request (header + 56 fixed bytes)
const REQUEST_INPUT_OFFSET: u32 = 120;
/// Output offset in an Ioctl response (header + 48 fixed bytes)
const RESPONSE_OUTPUT_OFFSET: u32 = 112;

/// SMB2 IOCTL Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2IoctlRequest {
    pub ctl_code: u32,
    pub file_id: FileId,
    pub max_input_response: u32,
    pub max_output_response: u32,
    pub flags: u32,
    pub input: Vec<u8>,
}

impl Smb2IoctlRequest {
    /// FSCTL_PIPE_TRANSCEIVE: write `input` to a named pipe and read the reply
    pub fn pipe_transceive(file_id: FileId, input: Vec<u8>, max_output: u32) -> Self {
        Self {
            ctl_code: fsctl::PIPE_TRANSCEIVE,
            file_id,
            max_input_response: 0,
            max_output_response: max_output,
            flags: fsctl::IS_FSCTL,
            input,
        }
    }
}

impl SmbMessage for Smb2IoctlRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 56)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::IOCTL_REQUEST, "ioctl request")?;

        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let ctl_code = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let input_offset = cursor.read_u32::<LittleEndian>()?;
        let input_count = cursor.read_u32::<LittleEndian>()?;
        let max_input_response = cursor.read_u32::<LittleEndian>()?;
        let _output_offset = cursor.read_u32::<LittleEndian>()?;
        let _output_count = cursor.read_u32::<LittleEndian>()?;
        let max_output_response = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;

        let input =
            header_relative(buf, input_offset as usize, input_count as usize, "ioctl input")?.to_vec();

        Ok(Self {
            ctl_code,
            file_id,
            max_input_response,
            max_output_response,
            flags,
            input,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(56 + self.input.len());
        buf.write_u16::<LittleEndian>(structure_size::IOCTL_REQUEST)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.ctl_code)?;
        self.file_id.write_to(&mut buf)?;
        let input_offset = if self.input.is_empty() { 0 } else { REQUEST_INPUT_OFFSET };
        buf.write_u32::<LittleEndian>(input_offset)?;
        buf.write_u32::<LittleEndian>(self.input.len() as u32)?;
        buf.write_u32::<LittleEndian>(self.max_input_response)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.max_output_response)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.input);
        pad_to(&mut buf, 57);
        Ok(buf)
    }
}

/// SMB2 IOCTL Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2IoctlResponse {
    pub ctl_code: u32,
    pub file_id: FileId,
    pub flags: u32,
    pub output: Vec<u8>,
}

impl SmbMessage for Smb2IoctlResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 48)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::IOCTL_RESPONSE, "ioctl response")?;

        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let ctl_code = cursor.read_u32::<LittleEndian>()?;
        let file_id = FileId::read(&mut cursor)?;
        let _input_offset = cursor.read_u32::<LittleEndian>()?;
        let _input_count = cursor.read_u32::<LittleEndian>()?;
        let output_offset = cursor.read_u32::<LittleEndian>()?;
        let output_count = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;

        let output =
            header_relative(buf, output_offset as usize, output_count as usize, "ioctl output")?
                .to_vec();

        Ok(Self {
            ctl_code,
            file_id,
            flags,
            output,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(48 + self.output.len());
        buf.write_u16::<LittleEndian>(structure_size::IOCTL_RESPONSE)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.ctl_code)?;
        self.file_id.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(RESPONSE_OUTPUT_OFFSET)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(RESPONSE_OUTPUT_OFFSET)?;
        buf.write_u32::<LittleEndian>(self.output.len() as u32)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.output);
        pad_to(&mut buf, 49);
        Ok(buf)
    }
}
