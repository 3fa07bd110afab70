//! DCE/RPC packet structures and serialization

use crate::dcerpc::ndr::NDR_DATA_REPRESENTATION;
use crate::dcerpc::{
    interfaces, PacketFlags, PacketType, SyntaxId, DCERPC_VERSION_MAJOR, DCERPC_VERSION_MINOR,
    MAX_FRAGMENT,
};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::io::{self, Cursor, Read, Write};
use uuid::Uuid;

/// Size of the common connection-oriented header
pub const HEADER_SIZE: usize = 16;

fn truncated(e: io::Error) -> Error {
    Error::ParseError(format!("DCE/RPC packet truncated: {}", e))
}

/// Common DCE/RPC packet header
#[derive(Debug, Clone)]
pub struct RpcHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub packet_type: PacketType,
    pub packet_flags: PacketFlags,
    pub data_representation: [u8; 4],
    pub frag_length: u16,
    pub auth_length: u16,
    pub call_id: u32,
}

impl RpcHeader {
    pub fn new(packet_type: PacketType, call_id: u32) -> Self {
        Self {
            version_major: DCERPC_VERSION_MAJOR,
            version_minor: DCERPC_VERSION_MINOR,
            packet_type,
            packet_flags: PacketFlags::single_fragment(),
            data_representation: NDR_DATA_REPRESENTATION,
            frag_length: HEADER_SIZE as u16, // patched by finish()
            auth_length: 0,
            call_id,
        }
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.version_major)?;
        writer.write_u8(self.version_minor)?;
        writer.write_u8(self.packet_type as u8)?;
        writer.write_u8(self.packet_flags.0)?;
        writer.write_all(&self.data_representation)?;
        writer.write_u16::<LittleEndian>(self.frag_length)?;
        writer.write_u16::<LittleEndian>(self.auth_length)?;
        writer.write_u32::<LittleEndian>(self.call_id)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let version_major = reader.read_u8().map_err(truncated)?;
        let version_minor = reader.read_u8().map_err(truncated)?;
        let packet_type = reader.read_u8().map_err(truncated)?;
        let packet_flags = reader.read_u8().map_err(truncated)?;

        let mut data_representation = [0u8; 4];
        reader
            .read_exact(&mut data_representation)
            .map_err(truncated)?;

        let frag_length = reader.read_u16::<LittleEndian>().map_err(truncated)?;
        let auth_length = reader.read_u16::<LittleEndian>().map_err(truncated)?;
        let call_id = reader.read_u32::<LittleEndian>().map_err(truncated)?;

        if version_major != DCERPC_VERSION_MAJOR {
            return Err(Error::Rpc(format!(
                "unsupported DCE/RPC version {}.{}",
                version_major, version_minor
            )));
        }
        if data_representation[0] & 0xF0 != NDR_DATA_REPRESENTATION[0] {
            return Err(Error::Rpc("big-endian DCE/RPC peers are not supported".into()));
        }

        Ok(Self {
            version_major,
            version_minor,
            packet_type: PacketType::try_from(packet_type)?,
            packet_flags: PacketFlags(packet_flags),
            data_representation,
            frag_length,
            auth_length,
            call_id,
        })
    }
}

/// Length of the fragment starting at `data`, once its header is available
pub fn fragment_length(data: &[u8]) -> Option<usize> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    Some(u16::from_le_bytes([data[8], data[9]]) as usize)
}

/// Patch frag_length now that the body is written
fn finish(mut buffer: Vec<u8>) -> Result<Vec<u8>> {
    let frag_len = u16::try_from(buffer.len()).map_err(|_| {
        Error::Rpc(format!("DCE/RPC fragment of {} bytes too large", buffer.len()))
    })?;
    buffer[8..10].copy_from_slice(&frag_len.to_le_bytes());
    Ok(buffer)
}

fn write_syntax(buffer: &mut Vec<u8>, syntax: &SyntaxId) -> Result<()> {
    buffer.write_all(&syntax.uuid.to_bytes_le())?;
    buffer.write_u16::<LittleEndian>(syntax.version_major)?;
    buffer.write_u16::<LittleEndian>(syntax.version_minor)?;
    Ok(())
}

fn read_syntax<R: Read>(reader: &mut R) -> Result<SyntaxId> {
    let mut uuid = [0u8; 16];
    reader.read_exact(&mut uuid).map_err(truncated)?;
    let version_major = reader.read_u16::<LittleEndian>().map_err(truncated)?;
    let version_minor = reader.read_u16::<LittleEndian>().map_err(truncated)?;
    Ok(SyntaxId {
        uuid: Uuid::from_bytes_le(uuid),
        version_major,
        version_minor,
    })
}

/// Presentation context offered in a BIND
#[derive(Debug, Clone)]
pub struct ContextItem {
    pub context_id: u16,
    pub abstract_syntax: SyntaxId,
    pub transfer_syntaxes: Vec<SyntaxId>,
}

/// Bind packet - establishes context
#[derive(Debug, Clone)]
pub struct BindPacket {
    pub call_id: u32,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    pub contexts: Vec<ContextItem>,
}

impl BindPacket {
    /// Bind `interface` as context 0 with the NDR transfer syntax
    pub fn new(call_id: u32, interface: SyntaxId) -> Self {
        Self {
            call_id,
            max_xmit_frag: MAX_FRAGMENT,
            max_recv_frag: MAX_FRAGMENT,
            assoc_group_id: 0,
            contexts: vec![ContextItem {
                context_id: 0,
                abstract_syntax: interface,
                transfer_syntaxes: vec![interfaces::NDR],
            }],
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        RpcHeader::new(PacketType::Bind, self.call_id).serialize(&mut buffer)?;

        buffer.write_u16::<LittleEndian>(self.max_xmit_frag)?;
        buffer.write_u16::<LittleEndian>(self.max_recv_frag)?;
        buffer.write_u32::<LittleEndian>(self.assoc_group_id)?;
        buffer.write_u8(self.contexts.len() as u8)?;
        buffer.write_all(&[0, 0, 0])?;

        for context in &self.contexts {
            buffer.write_u16::<LittleEndian>(context.context_id)?;
            buffer.write_u8(context.transfer_syntaxes.len() as u8)?;
            buffer.write_u8(0)?;
            write_syntax(&mut buffer, &context.abstract_syntax)?;
            for syntax in &context.transfer_syntaxes {
                write_syntax(&mut buffer, syntax)?;
            }
        }

        finish(buffer)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = RpcHeader::deserialize(&mut cursor)?;
        if header.packet_type != PacketType::Bind {
            return Err(Error::Rpc(format!("expected BIND, got {:?}", header.packet_type)));
        }

        let max_xmit_frag = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let max_recv_frag = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let assoc_group_id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let count = cursor.read_u8().map_err(truncated)?;
        cursor.set_position(cursor.position() + 3);

        let mut contexts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let context_id = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let n_transfer = cursor.read_u8().map_err(truncated)?;
            let _reserved = cursor.read_u8().map_err(truncated)?;
            let abstract_syntax = read_syntax(&mut cursor)?;
            let mut transfer_syntaxes = Vec::with_capacity(n_transfer as usize);
            for _ in 0..n_transfer {
                transfer_syntaxes.push(read_syntax(&mut cursor)?);
            }
            contexts.push(ContextItem {
                context_id,
                abstract_syntax,
                transfer_syntaxes,
            });
        }

        Ok(Self {
            call_id: header.call_id,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            contexts,
        })
    }
}

/// Per-context outcome of a bind
#[derive(Debug, Clone)]
pub struct ContextResult {
    pub result: u16,
    pub reason: u16,
    pub transfer_syntax: SyntaxId,
}

/// Bind acknowledgment packet
#[derive(Debug, Clone)]
pub struct BindAckPacket {
    pub call_id: u32,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    pub secondary_addr: String,
    pub results: Vec<ContextResult>,
}

impl BindAckPacket {
    /// Accept a single NDR context
    pub fn accept(call_id: u32, secondary_addr: &str) -> Self {
        Self {
            call_id,
            max_xmit_frag: MAX_FRAGMENT,
            max_recv_frag: MAX_FRAGMENT,
            assoc_group_id: 0x53f0,
            secondary_addr: secondary_addr.to_string(),
            results: vec![ContextResult {
                result: 0,
                reason: 0,
                transfer_syntax: interfaces::NDR,
            }],
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.results.first().map(|r| r.result == 0).unwrap_or(false)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        RpcHeader::new(PacketType::BindAck, self.call_id).serialize(&mut buffer)?;

        buffer.write_u16::<LittleEndian>(self.max_xmit_frag)?;
        buffer.write_u16::<LittleEndian>(self.max_recv_frag)?;
        buffer.write_u32::<LittleEndian>(self.assoc_group_id)?;

        let addr_len = self.secondary_addr.len() + 1;
        buffer.write_u16::<LittleEndian>(addr_len as u16)?;
        buffer.write_all(self.secondary_addr.as_bytes())?;
        buffer.write_u8(0)?;
        while buffer.len() % 4 != 0 {
            buffer.write_u8(0)?;
        }

        buffer.write_u8(self.results.len() as u8)?;
        buffer.write_all(&[0, 0, 0])?;
        for result in &self.results {
            buffer.write_u16::<LittleEndian>(result.result)?;
            buffer.write_u16::<LittleEndian>(result.reason)?;
            write_syntax(&mut buffer, &result.transfer_syntax)?;
        }

        finish(buffer)
    }

    fn parse_body(header: &RpcHeader, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let max_xmit_frag = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let max_recv_frag = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let assoc_group_id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;

        let addr_len = cursor.read_u16::<LittleEndian>().map_err(truncated)? as usize;
        let mut addr = vec![0u8; addr_len];
        cursor.read_exact(&mut addr).map_err(truncated)?;
        let end = addr.iter().position(|&b| b == 0).unwrap_or(addr.len());
        let secondary_addr = String::from_utf8_lossy(&addr[..end]).into_owned();
        let pos = cursor.position();
        cursor.set_position((pos + 3) & !3);

        let count = cursor.read_u8().map_err(truncated)?;
        cursor.set_position(cursor.position() + 3);
        let mut results = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let result = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let reason = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
            let transfer_syntax = read_syntax(cursor)?;
            results.push(ContextResult {
                result,
                reason,
                transfer_syntax,
            });
        }

        Ok(Self {
            call_id: header.call_id,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            secondary_addr,
            results,
        })
    }
}

/// Request packet - actual RPC call
#[derive(Debug, Clone)]
pub struct RequestPacket {
    pub call_id: u32,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub opnum: u16,
    pub stub_data: Vec<u8>,
}

impl RequestPacket {
    pub fn new(call_id: u32, context_id: u16, opnum: u16, stub_data: Vec<u8>) -> Self {
        Self {
            call_id,
            alloc_hint: stub_data.len() as u32,
            context_id,
            opnum,
            stub_data,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(24 + self.stub_data.len());
        RpcHeader::new(PacketType::Request, self.call_id).serialize(&mut buffer)?;

        buffer.write_u32::<LittleEndian>(self.alloc_hint)?;
        buffer.write_u16::<LittleEndian>(self.context_id)?;
        buffer.write_u16::<LittleEndian>(self.opnum)?;
        buffer.write_all(&self.stub_data)?;

        finish(buffer)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = RpcHeader::deserialize(&mut cursor)?;
        if header.packet_type != PacketType::Request {
            return Err(Error::Rpc(format!(
                "expected REQUEST, got {:?}",
                header.packet_type
            )));
        }
        let alloc_hint = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let context_id = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let opnum = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let stub_data = stub_slice(data, cursor.position() as usize, &header)?.to_vec();
        Ok(Self {
            call_id: header.call_id,
            alloc_hint,
            context_id,
            opnum,
            stub_data,
        })
    }
}

/// Stub bytes between `start` and the end of the fragment
fn stub_slice<'a>(data: &'a [u8], start: usize, header: &RpcHeader) -> Result<&'a [u8]> {
    let end = (header.frag_length as usize).saturating_sub(header.auth_length as usize);
    if end > data.len() || start > end {
        return Err(Error::ParseError(format!(
            "DCE/RPC fragment length {} exceeds {} available bytes",
            header.frag_length,
            data.len()
        )));
    }
    Ok(&data[start..end])
}

/// Response packet - RPC call result
#[derive(Debug, Clone)]
pub struct ResponsePacket {
    pub call_id: u32,
    pub flags: PacketFlags,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub stub_data: Vec<u8>,
}

impl ResponsePacket {
    pub fn new(call_id: u32, context_id: u16, stub_data: Vec<u8>) -> Self {
        Self {
            call_id,
            flags: PacketFlags::single_fragment(),
            alloc_hint: stub_data.len() as u32,
            context_id,
            stub_data,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(24 + self.stub_data.len());
        let mut header = RpcHeader::new(PacketType::Response, self.call_id);
        header.packet_flags = self.flags;
        header.serialize(&mut buffer)?;

        buffer.write_u32::<LittleEndian>(self.alloc_hint)?;
        buffer.write_u16::<LittleEndian>(self.context_id)?;
        buffer.write_u8(0)?; // cancel count
        buffer.write_u8(0)?;
        buffer.write_all(&self.stub_data)?;

        finish(buffer)
    }

    fn parse_body(header: &RpcHeader, data: &[u8], cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let alloc_hint = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let context_id = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let _cancel_count = cursor.read_u8().map_err(truncated)?;
        let _reserved = cursor.read_u8().map_err(truncated)?;
        let stub_data = stub_slice(data, cursor.position() as usize, header)?.to_vec();
        Ok(Self {
            call_id: header.call_id,
            flags: header.packet_flags,
            alloc_hint,
            context_id,
            stub_data,
        })
    }
}

/// Fault packet - RPC error
#[derive(Debug, Clone)]
pub struct FaultPacket {
    pub call_id: u32,
    pub context_id: u16,
    pub status: u32,
}

impl FaultPacket {
    pub fn new(call_id: u32, context_id: u16, status: u32) -> Self {
        Self {
            call_id,
            context_id,
            status,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        RpcHeader::new(PacketType::Fault, self.call_id).serialize(&mut buffer)?;

        buffer.write_u32::<LittleEndian>(0)?; // alloc hint
        buffer.write_u16::<LittleEndian>(self.context_id)?;
        buffer.write_u8(0)?;
        buffer.write_u8(0)?;
        buffer.write_u32::<LittleEndian>(self.status)?;
        buffer.write_u32::<LittleEndian>(0)?;

        finish(buffer)
    }

    fn parse_body(header: &RpcHeader, cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let _alloc_hint = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let context_id = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let _cancel_count = cursor.read_u8().map_err(truncated)?;
        let _reserved = cursor.read_u8().map_err(truncated)?;
        let status = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        Ok(Self {
            call_id: header.call_id,
            context_id,
            status,
        })
    }

    pub fn into_error(self) -> Error {
        Error::Rpc(format!("DCE/RPC fault 0x{:08x}", self.status))
    }
}

/// A packet received from the server side of the pipe
#[derive(Debug, Clone)]
pub enum ServerPdu {
    BindAck(BindAckPacket),
    BindNak { call_id: u32, reason: u16 },
    Response(ResponsePacket),
    Fault(FaultPacket),
}

impl ServerPdu {
    /// Parse one complete fragment
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = RpcHeader::deserialize(&mut cursor)?;
        match header.packet_type {
            PacketType::BindAck => Ok(ServerPdu::BindAck(BindAckPacket::parse_body(
                &header,
                &mut cursor,
            )?)),
            PacketType::BindNak => {
                let reason = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
                Ok(ServerPdu::BindNak {
                    call_id: header.call_id,
                    reason,
                })
            }
            PacketType::Response => Ok(ServerPdu::Response(ResponsePacket::parse_body(
                &header,
                data,
                &mut cursor,
            )?)),
            PacketType::Fault => Ok(ServerPdu::Fault(FaultPacket::parse_body(
                &header,
                &mut cursor,
            )?)),
            other => Err(Error::Rpc(format!(
                "unexpected {:?} packet from server",
                other
            ))),
        }
    }
}
