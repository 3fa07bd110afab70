//! Anonymous NTLMSSP token exchange
//!
//! Builds the NEGOTIATE and AUTHENTICATE messages of an anonymous (null
//! session) NTLMSSP logon. No challenge response is computed: both response
//! fields are empty apart from the single zero LM byte that marks the logon
//! as anonymous, so no key material is involved.

use super::Authenticator;
use crate::error::{Error, Result};
use crate::protocol::messages::common::{utf16le_decode, utf16le_encode};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};
use tracing::debug;

/// NTLM signature - "NTLMSSP\0"
pub const NTLMSSP_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// NTLM message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NtlmMessageType {
    Negotiate = 1,
    Challenge = 2,
    Authenticate = 3,
}

impl TryFrom<u32> for NtlmMessageType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Negotiate),
            2 => Ok(Self::Challenge),
            3 => Ok(Self::Authenticate),
            _ => Err(Error::ParseError(format!(
                "Invalid NTLM message type: {}",
                value
            ))),
        }
    }
}

bitflags! {
    /// NTLM negotiation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NtlmFlags: u32 {
        const NEGOTIATE_UNICODE = 0x00000001;
        const NEGOTIATE_OEM = 0x00000002;
        const REQUEST_TARGET = 0x00000004;
        const NEGOTIATE_SIGN = 0x00000010;
        const NEGOTIATE_SEAL = 0x00000020;
        const NEGOTIATE_NTLM = 0x00000200;
        const NEGOTIATE_ANONYMOUS = 0x00000800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x00001000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x00002000;
        const NEGOTIATE_ALWAYS_SIGN = 0x00008000;
        const TARGET_TYPE_DOMAIN = 0x00010000;
        const TARGET_TYPE_SERVER = 0x00020000;
        const NEGOTIATE_EXTENDED_SECURITY = 0x00080000;
        const NEGOTIATE_TARGET_INFO = 0x00800000;
        const NEGOTIATE_VERSION = 0x02000000;
        const NEGOTIATE_128 = 0x20000000;
        const NEGOTIATE_KEY_EXCHANGE = 0x40000000;
        const NEGOTIATE_56 = 0x80000000;
    }
}

impl NtlmFlags {
    fn client_default() -> Self {
        NtlmFlags::NEGOTIATE_UNICODE
            | NtlmFlags::REQUEST_TARGET
            | NtlmFlags::NEGOTIATE_NTLM
            | NtlmFlags::NEGOTIATE_ALWAYS_SIGN
            | NtlmFlags::NEGOTIATE_EXTENDED_SECURITY
            | NtlmFlags::NEGOTIATE_128
            | NtlmFlags::NEGOTIATE_56
    }
}

/// Length/offset descriptor of a variable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct SecurityBuffer {
    length: u16,
    offset: u32,
}

impl SecurityBuffer {
    fn read(cursor: &mut io::Cursor<&[u8]>) -> Result<Self> {
        let length = cursor.read_u16::<LittleEndian>()?;
        let _max_length = cursor.read_u16::<LittleEndian>()?;
        let offset = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { length, offset })
    }

    fn write_to(self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u16::<LittleEndian>(self.length)?;
        buf.write_u16::<LittleEndian>(self.length)?;
        buf.write_u32::<LittleEndian>(self.offset)?;
        Ok(())
    }

    fn slice<'a>(&self, message: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset as usize;
        let end = start + self.length as usize;
        if self.length == 0 {
            return Ok(&[]);
        }
        if end > message.len() {
            return Err(Error::ParseError(
                "Security buffer extends beyond message".into(),
            ));
        }
        Ok(&message[start..end])
    }
}

fn read_header(cursor: &mut io::Cursor<&[u8]>, expected: NtlmMessageType) -> Result<()> {
    let mut signature = [0u8; 8];
    cursor.read_exact(&mut signature)?;
    if &signature != NTLMSSP_SIGNATURE {
        return Err(Error::ParseError("Invalid NTLM signature".into()));
    }
    let message_type = NtlmMessageType::try_from(cursor.read_u32::<LittleEndian>()?)?;
    if message_type != expected {
        return Err(Error::ParseError(format!(
            "Expected NTLM {:?} message, got {:?}",
            expected, message_type
        )));
    }
    Ok(())
}

/// NTLM Type 1 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateMessage {
    pub flags: NtlmFlags,
}

impl NegotiateMessage {
    const SIZE: usize = 32;

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(NTLMSSP_SIGNATURE);
        buf.write_u32::<LittleEndian>(NtlmMessageType::Negotiate as u32)?;
        buf.write_u32::<LittleEndian>(self.flags.bits())?;
        // Domain and workstation are never supplied in the negotiate message.
        SecurityBuffer::default().write_to(&mut buf)?;
        SecurityBuffer::default().write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::ParseError("NTLM negotiate message too short".into()));
        }
        let mut cursor = io::Cursor::new(data);
        read_header(&mut cursor, NtlmMessageType::Negotiate)?;
        Ok(Self {
            flags: NtlmFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?),
        })
    }
}

/// NTLM Type 2 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub target_name: String,
    pub flags: NtlmFlags,
    pub challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl ChallengeMessage {
    const SIZE: usize = 48;

    pub fn new(target_name: impl Into<String>, challenge: [u8; 8]) -> Self {
        Self {
            target_name: target_name.into(),
            flags: NtlmFlags::NEGOTIATE_UNICODE
                | NtlmFlags::NEGOTIATE_NTLM
                | NtlmFlags::TARGET_TYPE_SERVER
                | NtlmFlags::NEGOTIATE_EXTENDED_SECURITY,
            challenge,
            target_info: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::ParseError("NTLM challenge message too short".into()));
        }
        let mut cursor = io::Cursor::new(data);
        read_header(&mut cursor, NtlmMessageType::Challenge)?;

        let target_name = SecurityBuffer::read(&mut cursor)?;
        let flags = NtlmFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let mut challenge = [0u8; 8];
        cursor.read_exact(&mut challenge)?;
        let _context = cursor.read_u64::<LittleEndian>()?;
        let target_info = SecurityBuffer::read(&mut cursor)?;

        let name_bytes = target_name.slice(data)?;
        let target_name = if flags.contains(NtlmFlags::NEGOTIATE_UNICODE) {
            utf16le_decode(name_bytes)
        } else {
            String::from_utf8_lossy(name_bytes).into_owned()
        };

        Ok(Self {
            target_name,
            flags,
            challenge,
            target_info: target_info.slice(data)?.to_vec(),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let name = utf16le_encode(&self.target_name);
        let mut buf = Vec::with_capacity(Self::SIZE + name.len() + self.target_info.len());
        buf.extend_from_slice(NTLMSSP_SIGNATURE);
        buf.write_u32::<LittleEndian>(NtlmMessageType::Challenge as u32)?;
        SecurityBuffer {
            length: name.len() as u16,
            offset: Self::SIZE as u32,
        }
        .write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(self.flags.bits())?;
        buf.extend_from_slice(&self.challenge);
        buf.write_u64::<LittleEndian>(0)?;
        SecurityBuffer {
            length: self.target_info.len() as u16,
            offset: (Self::SIZE + name.len()) as u32,
        }
        .write_to(&mut buf)?;
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&self.target_info);
        Ok(buf)
    }
}

/// NTLM Type 3 message as sent for an anonymous logon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateMessage {
    pub flags: NtlmFlags,
    pub lm_response: Vec<u8>,
    pub nt_response: Vec<u8>,
    pub domain: String,
    pub user: String,
    pub workstation: String,
}

impl AuthenticateMessage {
    const SIZE: usize = 64;

    pub fn anonymous(flags: NtlmFlags, domain: &str, user: &str, workstation: &str) -> Self {
        Self {
            flags: flags | NtlmFlags::NEGOTIATE_ANONYMOUS,
            lm_response: vec![0],
            nt_response: Vec::new(),
            domain: domain.to_string(),
            user: user.to_string(),
            workstation: workstation.to_string(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let domain = utf16le_encode(&self.domain);
        let user = utf16le_encode(&self.user);
        let workstation = utf16le_encode(&self.workstation);

        let fields: [&[u8]; 5] = [
            &self.lm_response,
            &self.nt_response,
            &domain,
            &user,
            &workstation,
        ];

        let mut buf = Vec::with_capacity(Self::SIZE + fields.iter().map(|f| f.len()).sum::<usize>());
        buf.extend_from_slice(NTLMSSP_SIGNATURE);
        buf.write_u32::<LittleEndian>(NtlmMessageType::Authenticate as u32)?;

        let mut offset = Self::SIZE as u32;
        for field in fields {
            SecurityBuffer {
                length: field.len() as u16,
                offset,
            }
            .write_to(&mut buf)?;
            offset += field.len() as u32;
        }
        // No session key without a password hash.
        SecurityBuffer { length: 0, offset }.write_to(&mut buf)?;
        buf.write_u32::<LittleEndian>(self.flags.bits())?;

        for field in fields {
            buf.extend_from_slice(field);
        }
        Ok(buf)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::ParseError(
                "NTLM authenticate message too short".into(),
            ));
        }
        let mut cursor = io::Cursor::new(data);
        read_header(&mut cursor, NtlmMessageType::Authenticate)?;

        let lm = SecurityBuffer::read(&mut cursor)?;
        let nt = SecurityBuffer::read(&mut cursor)?;
        let domain = SecurityBuffer::read(&mut cursor)?;
        let user = SecurityBuffer::read(&mut cursor)?;
        let workstation = SecurityBuffer::read(&mut cursor)?;
        let _session_key = SecurityBuffer::read(&mut cursor)?;
        let flags = NtlmFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);

        Ok(Self {
            flags,
            lm_response: lm.slice(data)?.to_vec(),
            nt_response: nt.slice(data)?.to_vec(),
            domain: utf16le_decode(domain.slice(data)?),
            user: utf16le_decode(user.slice(data)?),
            workstation: utf16le_decode(workstation.slice(data)?),
        })
    }

    pub fn is_anonymous(&self) -> bool {
        self.nt_response.is_empty() && self.lm_response.iter().all(|b| *b == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NtlmState {
    Initial,
    NegotiateSent,
    Done,
}

/// Anonymous NTLMSSP authenticator
#[derive(Debug, Clone)]
pub struct AnonymousNtlmssp {
    domain: String,
    user: String,
    workstation: String,
    state: NtlmState,
}

impl AnonymousNtlmssp {
    pub fn new(domain: &str, user: &str, workstation: &str) -> Self {
        Self {
            domain: domain.to_string(),
            user: user.to_string(),
            workstation: workstation.to_string(),
            state: NtlmState::Initial,
        }
    }
}

impl Authenticator for AnonymousNtlmssp {
    fn mechanism(&self) -> &'static str {
        "NTLMSSP (anonymous)"
    }

    fn initial_token(&mut self) -> Result<Vec<u8>> {
        self.state = NtlmState::NegotiateSent;
        NegotiateMessage {
            flags: NtlmFlags::client_default(),
        }
        .serialize()
    }

    fn respond(&mut self, server_token: &[u8]) -> Result<Vec<u8>> {
        if self.state != NtlmState::NegotiateSent {
            return Err(Error::AuthenticationFailed(format!(
                "unexpected server token in state {:?}",
                self.state
            )));
        }
        let challenge = ChallengeMessage::parse(server_token)?;
        debug!(
            "NTLM challenge from {:?}, flags {:?}",
            challenge.target_name, challenge.flags
        );
        self.state = NtlmState::Done;

        let flags = challenge.flags & NtlmFlags::client_default();
        AuthenticateMessage::anonymous(flags, &self.domain, &self.user, &self.workstation)
            .serialize()
    }
}
