//! Command dispatch table
//!
//! Every SMB2 command the client speaks has one entry in [`COMMANDS`]. The
//! entry fixes the structure sizes of both directions, the decoder used for
//! the reply body and the non-success statuses whose reply still carries that
//! command's body (e.g. `STATUS_BUFFER_OVERFLOW` on a pipe read). Any other
//! non-success status is decoded as an ERROR response and surfaces as
//! [`Error::Status`].

use crate::error::{Error, Result};
use crate::protocol::messages::*;
use crate::protocol::smb2_constants::{structure_size, Smb2Command, CREDIT_UNIT};
use crate::protocol::status::NtStatus;

/// Request record for one SMB2 command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Negotiate(Smb2NegotiateRequest),
    SessionSetup(Smb2SessionSetupRequest),
    Logoff,
    TreeConnect(Smb2TreeConnectRequest),
    TreeDisconnect,
    Create(Smb2CreateRequest),
    Close(Smb2CloseRequest),
    Flush(Smb2FlushRequest),
    Read(Smb2ReadRequest),
    Write(Smb2WriteRequest),
    Ioctl(Smb2IoctlRequest),
    Echo,
    QueryDirectory(Smb2QueryDirectoryRequest),
    QueryInfo(Smb2QueryInfoRequest),
    SetInfo(Smb2SetInfoRequest),
}

impl Request {
    pub fn command(&self) -> Smb2Command {
        match self {
            Request::Negotiate(_) => Smb2Command::Negotiate,
            Request::SessionSetup(_) => Smb2Command::SessionSetup,
            Request::Logoff => Smb2Command::Logoff,
            Request::TreeConnect(_) => Smb2Command::TreeConnect,
            Request::TreeDisconnect => Smb2Command::TreeDisconnect,
            Request::Create(_) => Smb2Command::Create,
            Request::Close(_) => Smb2Command::Close,
            Request::Flush(_) => Smb2Command::Flush,
            Request::Read(_) => Smb2Command::Read,
            Request::Write(_) => Smb2Command::Write,
            Request::Ioctl(_) => Smb2Command::Ioctl,
            Request::Echo => Smb2Command::Echo,
            Request::QueryDirectory(_) => Smb2Command::QueryDirectory,
            Request::QueryInfo(_) => Smb2Command::QueryInfo,
            Request::SetInfo(_) => Smb2Command::SetInfo,
        }
    }

    /// Encode the body that follows the header
    pub fn encode_body(&self) -> Result<Vec<u8>> {
        match self {
            Request::Negotiate(r) => r.serialize(),
            Request::SessionSetup(r) => r.serialize(),
            Request::Logoff | Request::TreeDisconnect | Request::Echo => Smb2EmptyBody.serialize(),
            Request::TreeConnect(r) => r.serialize(),
            Request::Create(r) => r.serialize(),
            Request::Close(r) => r.serialize(),
            Request::Flush(r) => r.serialize(),
            Request::Read(r) => r.serialize(),
            Request::Write(r) => r.serialize(),
            Request::Ioctl(r) => r.serialize(),
            Request::QueryDirectory(r) => r.serialize(),
            Request::QueryInfo(r) => r.serialize(),
            Request::SetInfo(r) => r.serialize(),
        }
    }

    /// Decode a request body; used by test servers
    pub fn decode(command: Smb2Command, body: &[u8]) -> Result<Self> {
        (command_info(command).decode_request)(body)
    }

    /// Largest of the payload sent and the payload the reply may carry
    pub fn payload_size(&self) -> usize {
        match self {
            Request::Read(r) => r.length as usize,
            Request::Write(r) => r.data.len(),
            Request::Ioctl(r) => r.input.len().max(r.max_output_response as usize),
            Request::QueryDirectory(r) => r.output_buffer_length as usize,
            Request::QueryInfo(r) => r.output_buffer_length as usize,
            Request::SetInfo(r) => r.buffer.len(),
            _ => 0,
        }
    }

    /// Credits consumed by this request under the multi-credit scheme
    pub fn credit_charge(&self) -> u16 {
        let size = self.payload_size();
        if size == 0 {
            1
        } else {
            ((size - 1) / CREDIT_UNIT + 1) as u16
        }
    }
}

/// Decoded reply body for one SMB2 command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Negotiate(Smb2NegotiateResponse),
    SessionSetup(Smb2SessionSetupResponse),
    Logoff,
    TreeConnect(Smb2TreeConnectResponse),
    TreeDisconnect,
    Create(Smb2CreateResponse),
    Close(Smb2CloseResponse),
    Flush,
    Read(Smb2ReadResponse),
    Write(Smb2WriteResponse),
    Ioctl(Smb2IoctlResponse),
    Echo,
    QueryDirectory(Smb2QueryDirectoryResponse),
    QueryInfo(Smb2QueryInfoResponse),
    SetInfo,
}

impl Reply {
    pub fn command(&self) -> Smb2Command {
        match self {
            Reply::Negotiate(_) => Smb2Command::Negotiate,
            Reply::SessionSetup(_) => Smb2Command::SessionSetup,
            Reply::Logoff => Smb2Command::Logoff,
            Reply::TreeConnect(_) => Smb2Command::TreeConnect,
            Reply::TreeDisconnect => Smb2Command::TreeDisconnect,
            Reply::Create(_) => Smb2Command::Create,
            Reply::Close(_) => Smb2Command::Close,
            Reply::Flush => Smb2Command::Flush,
            Reply::Read(_) => Smb2Command::Read,
            Reply::Write(_) => Smb2Command::Write,
            Reply::Ioctl(_) => Smb2Command::Ioctl,
            Reply::Echo => Smb2Command::Echo,
            Reply::QueryDirectory(_) => Smb2Command::QueryDirectory,
            Reply::QueryInfo(_) => Smb2Command::QueryInfo,
            Reply::SetInfo => Smb2Command::SetInfo,
        }
    }

    pub fn encode_body(&self) -> Result<Vec<u8>> {
        match self {
            Reply::Negotiate(r) => r.serialize(),
            Reply::SessionSetup(r) => r.serialize(),
            Reply::Logoff | Reply::TreeDisconnect | Reply::Echo | Reply::Flush => {
                Smb2EmptyBody.serialize()
            }
            Reply::TreeConnect(r) => r.serialize(),
            Reply::Create(r) => r.serialize(),
            Reply::Close(r) => r.serialize(),
            Reply::Read(r) => r.serialize(),
            Reply::Write(r) => r.serialize(),
            Reply::Ioctl(r) => r.serialize(),
            Reply::QueryDirectory(r) => r.serialize(),
            Reply::QueryInfo(r) => r.serialize(),
            Reply::SetInfo => Smb2SetInfoResponse.serialize(),
        }
    }
}

/// A decoded reply together with the header fields callers care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: NtStatus,
    pub message_id: u64,
    pub session_id: u64,
    pub tree_id: u32,
    pub reply: Reply,
}

/// One row of the command table
pub struct CommandInfo {
    pub command: Smb2Command,
    pub name: &'static str,
    pub request_size: u16,
    pub reply_size: u16,
    /// Non-success statuses whose reply body is still the command's own
    pub data_statuses: &'static [NtStatus],
    pub decode_reply: fn(&[u8]) -> Result<Reply>,
    pub decode_request: fn(&[u8]) -> Result<Request>,
}

macro_rules! command_table {
    ($($cmd:ident, $name:literal, $req:ident, $rep:ident, [$($st:ident),*],
       |$rb:ident| $reply:expr, |$qb:ident| $request:expr;)*) => {
        /// Static dispatch table indexed by command
        pub static COMMANDS: &[CommandInfo] = &[
            $(CommandInfo {
                command: Smb2Command::$cmd,
                name: $name,
                request_size: structure_size::$req,
                reply_size: structure_size::$rep,
                data_statuses: &[$(NtStatus::$st),*],
                decode_reply: |$rb| $reply,
                decode_request: |$qb| $request,
            },)*
        ];
    };
}

command_table! {
    Negotiate, "NEGOTIATE", NEGOTIATE_REQUEST, NEGOTIATE_RESPONSE, [],
        |b| Ok(Reply::Negotiate(Smb2NegotiateResponse::parse(b)?)),
        |b| Ok(Request::Negotiate(Smb2NegotiateRequest::parse(b)?));
    SessionSetup, "SESSION_SETUP", SESSION_SETUP_REQUEST, SESSION_SETUP_RESPONSE,
        [MORE_PROCESSING_REQUIRED],
        |b| Ok(Reply::SessionSetup(Smb2SessionSetupResponse::parse(b)?)),
        |b| Ok(Request::SessionSetup(Smb2SessionSetupRequest::parse(b)?));
    Logoff, "LOGOFF", LOGOFF_REQUEST, LOGOFF_RESPONSE, [],
        |b| Smb2EmptyBody::parse(b).map(|_| Reply::Logoff),
        |b| Smb2EmptyBody::parse(b).map(|_| Request::Logoff);
    TreeConnect, "TREE_CONNECT", TREE_CONNECT_REQUEST, TREE_CONNECT_RESPONSE, [],
        |b| Ok(Reply::TreeConnect(Smb2TreeConnectResponse::parse(b)?)),
        |b| Ok(Request::TreeConnect(Smb2TreeConnectRequest::parse(b)?));
    TreeDisconnect, "TREE_DISCONNECT", TREE_DISCONNECT_REQUEST, TREE_DISCONNECT_RESPONSE, [],
        |b| Smb2EmptyBody::parse(b).map(|_| Reply::TreeDisconnect),
        |b| Smb2EmptyBody::parse(b).map(|_| Request::TreeDisconnect);
    Create, "CREATE", CREATE_REQUEST, CREATE_RESPONSE, [],
        |b| Ok(Reply::Create(Smb2CreateResponse::parse(b)?)),
        |b| Ok(Request::Create(Smb2CreateRequest::parse(b)?));
    Close, "CLOSE", CLOSE_REQUEST, CLOSE_RESPONSE, [],
        |b| Ok(Reply::Close(Smb2CloseResponse::parse(b)?)),
        |b| Ok(Request::Close(Smb2CloseRequest::parse(b)?));
    Flush, "FLUSH", FLUSH_REQUEST, FLUSH_RESPONSE, [],
        |b| Smb2EmptyBody::parse(b).map(|_| Reply::Flush),
        |b| Ok(Request::Flush(Smb2FlushRequest::parse(b)?));
    Read, "READ", READ_REQUEST, READ_RESPONSE, [BUFFER_OVERFLOW],
        |b| Ok(Reply::Read(Smb2ReadResponse::parse(b)?)),
        |b| Ok(Request::Read(Smb2ReadRequest::parse(b)?));
    Write, "WRITE", WRITE_REQUEST, WRITE_RESPONSE, [],
        |b| Ok(Reply::Write(Smb2WriteResponse::parse(b)?)),
        |b| Ok(Request::Write(Smb2WriteRequest::parse(b)?));
    Ioctl, "IOCTL", IOCTL_REQUEST, IOCTL_RESPONSE, [BUFFER_OVERFLOW],
        |b| Ok(Reply::Ioctl(Smb2IoctlResponse::parse(b)?)),
        |b| Ok(Request::Ioctl(Smb2IoctlRequest::parse(b)?));
    Echo, "ECHO", ECHO_REQUEST, ECHO_RESPONSE, [],
        |b| Smb2EmptyBody::parse(b).map(|_| Reply::Echo),
        |b| Smb2EmptyBody::parse(b).map(|_| Request::Echo);
    QueryDirectory, "QUERY_DIRECTORY", QUERY_DIRECTORY_REQUEST, QUERY_DIRECTORY_RESPONSE, [],
        |b| Ok(Reply::QueryDirectory(Smb2QueryDirectoryResponse::parse(b)?)),
        |b| Ok(Request::QueryDirectory(Smb2QueryDirectoryRequest::parse(b)?));
    QueryInfo, "QUERY_INFO", QUERY_INFO_REQUEST, QUERY_INFO_RESPONSE, [BUFFER_OVERFLOW],
        |b| Ok(Reply::QueryInfo(Smb2QueryInfoResponse::parse(b)?)),
        |b| Ok(Request::QueryInfo(Smb2QueryInfoRequest::parse(b)?));
    SetInfo, "SET_INFO", SET_INFO_REQUEST, SET_INFO_RESPONSE, [],
        |b| Smb2SetInfoResponse::parse(b).map(|_| Reply::SetInfo),
        |b| Ok(Request::SetInfo(Smb2SetInfoRequest::parse(b)?));
}

/// Table row for a command the client speaks.
///
/// Panics for commands outside the table; the client never builds those.
pub fn command_info(command: Smb2Command) -> &'static CommandInfo {
    COMMANDS
        .iter()
        .find(|info| info.command == command)
        .unwrap_or_else(|| panic!("no codec for command {:?}", command))
}

/// Look up a command that arrived off the wire
pub fn try_command_info(command: Smb2Command) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|info| info.command == command)
}

/// Decode a reply body according to its header status
pub fn decode_reply(command: Smb2Command, status: NtStatus, body: &[u8]) -> Result<Reply> {
    let info = try_command_info(command).ok_or_else(|| {
        Error::Protocol(format!("reply for unsupported command {:?}", command))
    })?;

    if status.is_success() || info.data_statuses.contains(&status) {
        return (info.decode_reply)(body);
    }

    // The error body carries nothing the client acts on.
    let _ = Smb2ErrorResponse::parse(body)?;
    Err(Error::status(status, info.name))
}
