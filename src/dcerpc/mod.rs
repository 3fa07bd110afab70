//! DCE/RPC over SMB named pipes
//!
//! Just enough connection-oriented DCE/RPC to bind the `srvsvc` interface on
//! `IPC$` and issue share enumeration calls. Packets are built and parsed
//! here; moving them through the pipe is the client's business.

pub mod ndr;
pub mod packet;
pub mod srvsvc;

use crate::error::Error;
use std::convert::TryFrom;
use uuid::Uuid;

/// DCE/RPC protocol version
pub const DCERPC_VERSION_MAJOR: u8 = 5;
pub const DCERPC_VERSION_MINOR: u8 = 0;

/// Fragment size advertised in BIND
pub const MAX_FRAGMENT: u16 = 4280;

/// DCE/RPC packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Request = 0,
    Response = 2,
    Fault = 3,
    Bind = 11,
    BindAck = 12,
    BindNak = 13,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketType::Request),
            2 => Ok(PacketType::Response),
            3 => Ok(PacketType::Fault),
            11 => Ok(PacketType::Bind),
            12 => Ok(PacketType::BindAck),
            13 => Ok(PacketType::BindNak),
            _ => Err(Error::ParseError(format!(
                "Unsupported DCE/RPC packet type: {}",
                value
            ))),
        }
    }
}

/// DCE/RPC packet flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFlags(pub u8);

impl PacketFlags {
    pub const FIRST_FRAG: u8 = 0x01;
    pub const LAST_FRAG: u8 = 0x02;

    pub fn single_fragment() -> Self {
        Self(Self::FIRST_FRAG | Self::LAST_FRAG)
    }

    pub fn is_first_frag(&self) -> bool {
        self.0 & Self::FIRST_FRAG != 0
    }

    pub fn is_last_frag(&self) -> bool {
        self.0 & Self::LAST_FRAG != 0
    }
}

/// Interface or transfer syntax identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxId {
    pub uuid: Uuid,
    pub version_major: u16,
    pub version_minor: u16,
}

/// Well-known syntaxes
pub mod interfaces {
    use super::SyntaxId;
    use uuid::uuid;

    /// Server Service: share enumeration and server info
    pub const SRVSVC: SyntaxId = SyntaxId {
        uuid: uuid!("4B324FC8-1670-01D3-1278-5A47BF6EE188"),
        version_major: 3,
        version_minor: 0,
    };

    /// 32-bit NDR transfer syntax
    pub const NDR: SyntaxId = SyntaxId {
        uuid: uuid!("8A885D04-1CEB-11C9-9FE8-08002B104860"),
        version_major: 2,
        version_minor: 0,
    };
}

/// Well-known RPC fault status codes
pub mod fault {
    pub const OP_RNG_ERROR: u32 = 0x1C01_0002;
    pub const UNKNOWN_IF: u32 = 0x1C01_0003;
    pub const PROTO_ERROR: u32 = 0x1C01_000B;
}
