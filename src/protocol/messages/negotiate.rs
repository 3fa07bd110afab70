//! SMB2 Negotiate messages

use super::common::{ensure_len, expect_structure_size, header_relative, SmbMessage};
use crate::error::Result;
use crate::protocol::smb2_constants::{structure_size, SecurityMode, Smb2Capabilities, Smb2Dialect};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};
use uuid::Uuid;

/// SMB2 Negotiate Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2NegotiateRequest {
    pub security_mode: SecurityMode,
    pub capabilities: Smb2Capabilities,
    pub client_guid: Uuid,
    pub dialects: Vec<Smb2Dialect>,
}

impl Smb2NegotiateRequest {
    pub fn new(dialects: Vec<Smb2Dialect>, client_guid: Uuid) -> Self {
        Self {
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: Smb2Capabilities::LARGE_MTU,
            client_guid,
            dialects,
        }
    }
}

impl SmbMessage for Smb2NegotiateRequest {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 36)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::NEGOTIATE_REQUEST, "negotiate request")?;

        let dialect_count = cursor.read_u16::<LittleEndian>()?;
        let security_mode = SecurityMode::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let capabilities = Smb2Capabilities::from_bits_retain(cursor.read_u32::<LittleEndian>()?);

        let mut guid_bytes = [0u8; 16];
        cursor.read_exact(&mut guid_bytes)?;
        let client_guid = Uuid::from_bytes_le(guid_bytes);
        let _client_start_time = cursor.read_u64::<LittleEndian>()?;

        // Unknown dialects are skipped rather than rejected, a server must pick one it knows.
        let mut dialects = Vec::with_capacity(dialect_count as usize);
        for _ in 0..dialect_count {
            if let Ok(dialect) = Smb2Dialect::try_from(cursor.read_u16::<LittleEndian>()?) {
                dialects.push(dialect);
            }
        }

        Ok(Self {
            security_mode,
            capabilities,
            client_guid,
            dialects,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(36 + self.dialects.len() * 2);
        buf.write_u16::<LittleEndian>(structure_size::NEGOTIATE_REQUEST)?;
        buf.write_u16::<LittleEndian>(self.dialects.len() as u16)?;
        buf.write_u16::<LittleEndian>(self.security_mode.bits())?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(self.capabilities.bits())?;
        buf.extend_from_slice(&self.client_guid.to_bytes_le());
        buf.write_u64::<LittleEndian>(0)?;
        for dialect in &self.dialects {
            buf.write_u16::<LittleEndian>(*dialect as u16)?;
        }
        Ok(buf)
    }
}

/// SMB2 Negotiate Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smb2NegotiateResponse {
    pub security_mode: SecurityMode,
    pub dialect_revision: Smb2Dialect,
    pub server_guid: Uuid,
    pub capabilities: Smb2Capabilities,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub system_time: u64,
    pub server_start_time: u64,
    pub security_blob: Vec<u8>,
}

impl SmbMessage for Smb2NegotiateResponse {
    fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, 64)?;
        let mut cursor = io::Cursor::new(buf);
        expect_structure_size(&mut cursor, structure_size::NEGOTIATE_RESPONSE, "negotiate response")?;

        let security_mode = SecurityMode::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        let dialect_revision = Smb2Dialect::try_from(cursor.read_u16::<LittleEndian>()?)?;
        let _negotiate_context_count = cursor.read_u16::<LittleEndian>()?;

        let mut guid_bytes = [0u8; 16];
        cursor.read_exact(&mut guid_bytes)?;
        let server_guid = Uuid::from_bytes_le(guid_bytes);

        let capabilities = Smb2Capabilities::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let max_transact_size = cursor.read_u32::<LittleEndian>()?;
        let max_read_size = cursor.read_u32::<LittleEndian>()?;
        let max_write_size = cursor.read_u32::<LittleEndian>()?;
        let system_time = cursor.read_u64::<LittleEndian>()?;
        let server_start_time = cursor.read_u64::<LittleEndian>()?;
        let security_buffer_offset = cursor.read_u16::<LittleEndian>()?;
        let security_buffer_length = cursor.read_u16::<LittleEndian>()?;

        let security_blob = header_relative(
            buf,
            security_buffer_offset as usize,
            security_buffer_length as usize,
            "negotiate security buffer",
        )?
        .to_vec();

        Ok(Self {
            security_mode,
            dialect_revision,
            server_guid,
            capabilities,
            max_transact_size,
            max_read_size,
            max_write_size,
            system_time,
            server_start_time,
            security_blob,
        })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64 + self.security_blob.len());
        buf.write_u16::<LittleEndian>(structure_size::NEGOTIATE_RESPONSE)?;
        buf.write_u16::<LittleEndian>(self.security_mode.bits())?;
        buf.write_u16::<LittleEndian>(self.dialect_revision as u16)?;
        buf.write_u16::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.server_guid.to_bytes_le());
        buf.write_u32::<LittleEndian>(self.capabilities.bits())?;
        buf.write_u32::<LittleEndian>(self.max_transact_size)?;
        buf.write_u32::<LittleEndian>(self.max_read_size)?;
        buf.write_u32::<LittleEndian>(self.max_write_size)?;
        buf.write_u64::<LittleEndian>(self.system_time)?;
        buf.write_u64::<LittleEndian>(self.server_start_time)?;
        let offset = if self.security_blob.is_empty() { 0 } else { 128 };
        buf.write_u16::<LittleEndian>(offset)?;
        buf.write_u16::<LittleEndian>(self.security_blob.len() as u16)?;
        buf.write_u32::<LittleEndian>(0)?;
        buf.extend_from_slice(&self.security_blob);
        super::common::pad_to(&mut buf, 65);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_request_fixture() {
        let guid = Uuid::from_u128(0x00112233_4455_6677_8899_aabbccddeeff);
        let req = Smb2NegotiateRequest::new(vec![Smb2Dialect::Smb202, Smb2Dialect::Smb210], guid);
        let bytes = req.serialize().unwrap();

        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], &[36, 0, 2, 0]);
        // GUID is sent in mixed-endian form
        assert_eq!(&bytes[12..16], &[0x33, 0x22, 0x11, 0x00]);
        assert_eq!(&bytes[36..40], &[0x02, 0x02, 0x10, 0x02]);
        assert_eq!(Smb2NegotiateRequest::parse(&bytes).unwrap(), req);
    }

    #[test]
    fn test_negotiate_response_fixture() {
        let mut body = vec![0u8; 64];
        body[0] = 65;
        body[2] = 0x01;
        body[4..6].copy_from_slice(&0x0302u16.to_le_bytes());
        body[24..28].copy_from_slice(&0x4u32.to_le_bytes());
        body[28..32].copy_from_slice(&8_388_608u32.to_le_bytes());
        body[32..36].copy_from_slice(&1_048_576u32.to_le_bytes());
        body[36..40].copy_from_slice(&65_536u32.to_le_bytes());
        body[56..58].copy_from_slice(&128u16.to_le_bytes());
        body[58..60].copy_from_slice(&3u16.to_le_bytes());
        body.extend_from_slice(&[0x60, 0x01, 0x02]);

        let resp = Smb2NegotiateResponse::parse(&body).unwrap();
        assert_eq!(resp.dialect_revision, Smb2Dialect::Smb302);
        assert_eq!(resp.security_mode, SecurityMode::SIGNING_ENABLED);
        assert_eq!(resp.capabilities, Smb2Capabilities::LARGE_MTU);
        assert_eq!(resp.max_transact_size, 8_388_608);
        assert_eq!(resp.max_read_size, 1_048_576);
        assert_eq!(resp.max_write_size, 65_536);
        assert_eq!(resp.security_blob, vec![0x60, 0x01, 0x02]);
    }

    #[test]
    fn test_negotiate_response_rejects_unknown_dialect() {
        let mut body = vec![0u8; 65];
        body[0] = 65;
        body[4..6].copy_from_slice(&0x0299u16.to_le_bytes());
        assert!(Smb2NegotiateResponse::parse(&body).is_err());
    }
}
