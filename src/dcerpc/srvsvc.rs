//! SRVSVC (Server Service) share calls
//!
//! NetShareEnumAll (opnum 15) and NetShareGetInfo (opnum 16), information
//! level 1 only. Both directions are provided: the client encodes requests
//! and decodes replies, and the reply encoders let a test server answer.

use crate::dcerpc::ndr::{NdrDecoder, NdrEncoder};
use crate::error::{Error, Result};

/// Pipe name opened on `IPC$`
pub const PIPE_NAME: &str = "srvsvc";

pub const OPNUM_NET_SHARE_ENUM_ALL: u16 = 15;
pub const OPNUM_NET_SHARE_GET_INFO: u16 = 16;

/// The only information level understood
pub const SHARE_INFO_LEVEL_1: u32 = 1;

/// Share type values as reported in SHARE_INFO_1
pub mod share_type {
    pub const DISKTREE: u32 = 0x0000_0000;
    pub const PRINTQ: u32 = 0x0000_0001;
    pub const DEVICE: u32 = 0x0000_0002;
    pub const IPC: u32 = 0x0000_0003;
    pub const TEMPORARY: u32 = 0x4000_0000;
    pub const HIDDEN: u32 = 0x8000_0000;

    /// Mask for the base type without modifier bits
    pub const TYPE_MASK: u32 = 0x0000_00FF;
}

/// SHARE_INFO_1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInfo {
    pub name: String,
    pub share_type: u32,
    pub comment: String,
}

impl ShareInfo {
    pub fn new(name: &str, share_type: u32, comment: &str) -> Self {
        Self {
            name: name.to_string(),
            share_type,
            comment: comment.to_string(),
        }
    }

    /// Base type with TEMPORARY / HIDDEN stripped
    pub fn base_type(&self) -> u32 {
        self.share_type & share_type::TYPE_MASK
    }

    pub fn is_hidden(&self) -> bool {
        self.share_type & share_type::HIDDEN != 0
    }

    pub fn is_temporary(&self) -> bool {
        self.share_type & share_type::TEMPORARY != 0
    }
}

/// Decoded NetShareEnumAll reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEnum {
    pub level: u32,
    pub total_entries: u32,
    pub resume_handle: Option<u32>,
    pub shares: Vec<ShareInfo>,
}

/// Server name as sent by clients, `\\host`
fn server_unc(server: &str) -> String {
    format!("\\\\{}", server)
}

fn check_werror(call: &str, status: u32) -> Result<()> {
    if status != 0 {
        return Err(Error::Rpc(format!("{} failed with WERROR 0x{:08x}", call, status)));
    }
    Ok(())
}

/// Build the NetShareEnumAll request stub
pub fn encode_share_enum_all_request(server: &str) -> Result<Vec<u8>> {
    let mut enc = NdrEncoder::new();
    enc.encode_unique_string(Some(&server_unc(server)))?;

    // SHARE_ENUM_STRUCT: level + union { SHARE_INFO_1_CONTAINER* }
    enc.encode_u32(SHARE_INFO_LEVEL_1)?;
    enc.encode_u32(SHARE_INFO_LEVEL_1)?;
    enc.encode_pointer(true)?;
    enc.encode_u32(0)?; // EntriesRead
    enc.encode_pointer(false)?; // Buffer

    enc.encode_u32(0xFFFF_FFFF)?; // PreferedMaximumLength
    enc.encode_pointer(true)?;
    enc.encode_u32(0)?; // ResumeHandle
    Ok(enc.into_bytes())
}

/// Server side: extract the server name from a NetShareEnumAll request
pub fn decode_share_enum_all_request(stub: &[u8]) -> Result<Option<String>> {
    let mut dec = NdrDecoder::new(stub);
    let server = dec.decode_unique_string()?;
    let level = dec.decode_u32()?;
    if level != SHARE_INFO_LEVEL_1 {
        return Err(Error::Rpc(format!("unsupported share info level {}", level)));
    }
    Ok(server)
}

/// Encode the fixed part of each SHARE_INFO_1 entry
fn encode_info1_fixed(enc: &mut NdrEncoder, share: &ShareInfo) -> Result<()> {
    enc.encode_pointer(true)?;
    enc.encode_u32(share.share_type)?;
    enc.encode_pointer(true)
}

fn encode_info1_deferred(enc: &mut NdrEncoder, share: &ShareInfo) -> Result<()> {
    enc.encode_string(&share.name)?;
    enc.encode_string(&share.comment)
}

/// Pointers inside SHARE_INFO_1 come first; the strings they refer to follow
struct Info1Ptrs {
    share_type: u32,
    has_name: bool,
    has_comment: bool,
}

fn decode_info1_fixed(dec: &mut NdrDecoder<'_>) -> Result<Info1Ptrs> {
    let has_name = dec.decode_pointer()?;
    let share_type = dec.decode_u32()?;
    let has_comment = dec.decode_pointer()?;
    Ok(Info1Ptrs {
        share_type,
        has_name,
        has_comment,
    })
}

fn decode_info1_deferred(dec: &mut NdrDecoder<'_>, ptrs: &Info1Ptrs) -> Result<ShareInfo> {
    let name = if ptrs.has_name {
        dec.decode_string()?
    } else {
        String::new()
    };
    let comment = if ptrs.has_comment {
        dec.decode_string()?
    } else {
        String::new()
    };
    Ok(ShareInfo {
        name,
        share_type: ptrs.share_type,
        comment,
    })
}

/// Server side: NetShareEnumAll reply stub
pub fn encode_share_enum_all_reply(shares: &[ShareInfo]) -> Result<Vec<u8>> {
    let mut enc = NdrEncoder::new();
    enc.encode_u32(SHARE_INFO_LEVEL_1)?;
    enc.encode_u32(SHARE_INFO_LEVEL_1)?;
    enc.encode_pointer(true)?; // container

    enc.encode_u32(shares.len() as u32)?;
    enc.encode_pointer(!shares.is_empty())?;
    if !shares.is_empty() {
        enc.encode_u32(shares.len() as u32)?; // conformance
        for share in shares {
            encode_info1_fixed(&mut enc, share)?;
        }
        for share in shares {
            encode_info1_deferred(&mut enc, share)?;
        }
    }

    enc.encode_u32(shares.len() as u32)?; // TotalEntries
    enc.encode_pointer(true)?;
    enc.encode_u32(0)?; // ResumeHandle
    enc.encode_u32(0)?; // WERROR
    Ok(enc.into_bytes())
}

/// Decode a NetShareEnumAll reply stub
pub fn decode_share_enum_all_reply(stub: &[u8]) -> Result<ShareEnum> {
    let mut dec = NdrDecoder::new(stub);
    let level = dec.decode_u32()?;
    let switch = dec.decode_u32()?;
    if level != SHARE_INFO_LEVEL_1 || switch != level {
        return Err(Error::Rpc(format!(
            "unexpected share info level {} (switch {})",
            level, switch
        )));
    }

    let mut shares = Vec::new();
    if dec.decode_pointer()? {
        let count = dec.decode_u32()?;
        if dec.decode_pointer()? {
            let max_count = dec.decode_u32()?;
            if max_count < count {
                return Err(Error::Rpc(format!(
                    "share array conformance {} below entry count {}",
                    max_count, count
                )));
            }
            // 12 bytes per fixed entry bounds the allocation
            if (max_count as usize).saturating_mul(12) > dec.remaining() {
                return Err(Error::Rpc(format!("share array of {} entries truncated", max_count)));
            }
            let mut ptrs = Vec::with_capacity(max_count as usize);
            for _ in 0..max_count {
                ptrs.push(decode_info1_fixed(&mut dec)?);
            }
            for p in &ptrs {
                shares.push(decode_info1_deferred(&mut dec, p)?);
            }
            shares.truncate(count as usize);
        }
    }

    let total_entries = dec.decode_u32()?;
    let resume_handle = if dec.decode_pointer()? {
        Some(dec.decode_u32()?)
    } else {
        None
    };
    let status = dec.decode_u32()?;
    check_werror("NetShareEnumAll", status)?;

    Ok(ShareEnum {
        level,
        total_entries,
        resume_handle,
        shares,
    })
}

/// Build the NetShareGetInfo request stub
pub fn encode_share_get_info_request(server: &str, share: &str) -> Result<Vec<u8>> {
    let mut enc = NdrEncoder::new();
    enc.encode_unique_string(Some(&server_unc(server)))?;
    enc.encode_string(share)?; // [ref] pointer: no referent id
    enc.encode_u32(SHARE_INFO_LEVEL_1)?;
    Ok(enc.into_bytes())
}

/// Server side: extract the share name from a NetShareGetInfo request
pub fn decode_share_get_info_request(stub: &[u8]) -> Result<String> {
    let mut dec = NdrDecoder::new(stub);
    let _server = dec.decode_unique_string()?;
    let share = dec.decode_string()?;
    let level = dec.decode_u32()?;
    if level != SHARE_INFO_LEVEL_1 {
        return Err(Error::Rpc(format!("unsupported share info level {}", level)));
    }
    Ok(share)
}

/// Server side: NetShareGetInfo reply; `Err(werror)` encodes a failure
pub fn encode_share_get_info_reply(result: std::result::Result<&ShareInfo, u32>) -> Result<Vec<u8>> {
    let mut enc = NdrEncoder::new();
    enc.encode_u32(SHARE_INFO_LEVEL_1)?;
    match result {
        Ok(share) => {
            enc.encode_pointer(true)?;
            encode_info1_fixed(&mut enc, share)?;
            encode_info1_deferred(&mut enc, share)?;
            enc.encode_u32(0)?;
        }
        Err(werror) => {
            enc.encode_pointer(false)?;
            enc.encode_u32(werror)?;
        }
    }
    Ok(enc.into_bytes())
}

/// Decode a NetShareGetInfo reply stub
pub fn decode_share_get_info_reply(stub: &[u8]) -> Result<ShareInfo> {
    let mut dec = NdrDecoder::new(stub);
    let level = dec.decode_u32()?;
    if level != SHARE_INFO_LEVEL_1 {
        return Err(Error::Rpc(format!("unexpected share info level {}", level)));
    }
    let info = if dec.decode_pointer()? {
        let ptrs = decode_info1_fixed(&mut dec)?;
        Some(decode_info1_deferred(&mut dec, &ptrs)?)
    } else {
        None
    };
    let status = dec.decode_u32()?;
    check_werror("NetShareGetInfo", status)?;
    info.ok_or_else(|| Error::Rpc("NetShareGetInfo returned no share info".into()))
}
