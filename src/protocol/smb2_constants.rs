//! SMB2/3 protocol constants

use bitflags::bitflags;

/// SMB2 magic as bytes
pub const SMB2_MAGIC: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// SMB2 magic as u32
pub const SMB2_MAGIC_U32: u32 = 0x424D53FE;

/// SMB2 header size
pub const SMB2_HEADER_SIZE: usize = 64;

/// File id used by related compound members to address the preceding CREATE
pub const COMPOUND_FILE_ID: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Credits are charged per 64KiB of payload with LARGE_MTU
pub const CREDIT_UNIT: usize = 65536;

/// Default transfer limits until the server says otherwise
pub mod limits {
    pub const DEFAULT_MAX_TRANSACT_SIZE: u32 = 65536;
    pub const DEFAULT_MAX_READ_SIZE: u32 = 65536;
    pub const DEFAULT_MAX_WRITE_SIZE: u32 = 65536;
    /// Output buffer requested for QUERY_DIRECTORY / QUERY_INFO / IOCTL
    pub const DEFAULT_OUTPUT_BUFFER: u32 = 65536;
}

/// StructureSize field of every request and reply body
pub mod structure_size {
    pub const HEADER: u16 = 64;
    pub const ERROR_RESPONSE: u16 = 9;
    pub const NEGOTIATE_REQUEST: u16 = 36;
    pub const NEGOTIATE_RESPONSE: u16 = 65;
    pub const SESSION_SETUP_REQUEST: u16 = 25;
    pub const SESSION_SETUP_RESPONSE: u16 = 9;
    pub const LOGOFF_REQUEST: u16 = 4;
    pub const LOGOFF_RESPONSE: u16 = 4;
    pub const TREE_CONNECT_REQUEST: u16 = 9;
    pub const TREE_CONNECT_RESPONSE: u16 = 16;
    pub const TREE_DISCONNECT_REQUEST: u16 = 4;
    pub const TREE_DISCONNECT_RESPONSE: u16 = 4;
    pub const CREATE_REQUEST: u16 = 57;
    pub const CREATE_RESPONSE: u16 = 89;
    pub const CLOSE_REQUEST: u16 = 24;
    pub const CLOSE_RESPONSE: u16 = 60;
    pub const FLUSH_REQUEST: u16 = 24;
    pub const FLUSH_RESPONSE: u16 = 4;
    pub const READ_REQUEST: u16 = 49;
    pub const READ_RESPONSE: u16 = 17;
    pub const WRITE_REQUEST: u16 = 49;
    pub const WRITE_RESPONSE: u16 = 17;
    pub const IOCTL_REQUEST: u16 = 57;
    pub const IOCTL_RESPONSE: u16 = 49;
    pub const ECHO_REQUEST: u16 = 4;
    pub const ECHO_RESPONSE: u16 = 4;
    pub const QUERY_DIRECTORY_REQUEST: u16 = 33;
    pub const QUERY_DIRECTORY_RESPONSE: u16 = 9;
    pub const QUERY_INFO_REQUEST: u16 = 41;
    pub const QUERY_INFO_RESPONSE: u16 = 9;
    pub const SET_INFO_REQUEST: u16 = 33;
    pub const SET_INFO_RESPONSE: u16 = 2;
}

/// SMB2 Header Flags
pub mod header_flags {
    pub const RESPONSE: u32 = 0x00000001;
    pub const ASYNC_COMMAND: u32 = 0x00000002;
    pub const RELATED_OPERATIONS: u32 = 0x00000004;
    pub const SIGNED: u32 = 0x00000008;
    pub const DFS_OPERATIONS: u32 = 0x10000000;
}

bitflags! {
    /// File attributes as defined in MS-FSCC
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u32 {
        const READONLY            = 0x00000001;
        const HIDDEN              = 0x00000002;
        const SYSTEM              = 0x00000004;
        const DIRECTORY           = 0x00000010;
        const ARCHIVE             = 0x00000020;
        const NORMAL              = 0x00000080;
        const TEMPORARY           = 0x00000100;
        const SPARSE_FILE         = 0x00000200;
        const REPARSE_POINT       = 0x00000400;
        const COMPRESSED          = 0x00000800;
        const OFFLINE             = 0x00001000;
        const NOT_CONTENT_INDEXED = 0x00002000;
        const ENCRYPTED           = 0x00004000;
    }
}

bitflags! {
    /// File access rights
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DesiredAccess: u32 {
        const DELETE                   = 0x00010000;
        const READ_CONTROL             = 0x00020000;
        const WRITE_DAC                = 0x00040000;
        const WRITE_OWNER              = 0x00080000;
        const SYNCHRONIZE              = 0x00100000;

        const FILE_READ_DATA           = 0x00000001;
        const FILE_WRITE_DATA          = 0x00000002;
        const FILE_APPEND_DATA         = 0x00000004;
        const FILE_READ_EA             = 0x00000008;
        const FILE_WRITE_EA            = 0x00000010;
        const FILE_EXECUTE             = 0x00000020;
        const FILE_DELETE_CHILD        = 0x00000040;
        const FILE_READ_ATTRIBUTES     = 0x00000080;
        const FILE_WRITE_ATTRIBUTES    = 0x00000100;

        const MAXIMUM_ALLOWED          = 0x02000000;
        const GENERIC_ALL              = 0x10000000;
        const GENERIC_EXECUTE          = 0x20000000;
        const GENERIC_WRITE            = 0x40000000;
        const GENERIC_READ             = 0x80000000;

        const FILE_GENERIC_READ        = Self::SYNCHRONIZE.bits() |
                                         Self::FILE_READ_DATA.bits() |
                                         Self::FILE_READ_ATTRIBUTES.bits() |
                                         Self::FILE_READ_EA.bits() |
                                         Self::READ_CONTROL.bits();

        const FILE_GENERIC_WRITE       = Self::SYNCHRONIZE.bits() |
                                         Self::FILE_WRITE_DATA.bits() |
                                         Self::FILE_WRITE_ATTRIBUTES.bits() |
                                         Self::FILE_WRITE_EA.bits() |
                                         Self::FILE_APPEND_DATA.bits() |
                                         Self::READ_CONTROL.bits();
    }
}

bitflags! {
    /// File share access rights
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareAccess: u32 {
        const FILE_SHARE_READ   = 0x00000001;
        const FILE_SHARE_WRITE  = 0x00000002;
        const FILE_SHARE_DELETE = 0x00000004;
        const FILE_SHARE_ALL    = 0x00000007;
    }
}

/// Create disposition values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CreateDisposition {
    /// If file exists, supersede. If file doesn't exist, create.
    Supersede = 0x00000000,
    /// If file exists, open. If file doesn't exist, fail.
    Open = 0x00000001,
    /// If file exists, fail. If file doesn't exist, create.
    Create = 0x00000002,
    /// If file exists, open. If file doesn't exist, create.
    OpenIf = 0x00000003,
    /// If file exists, overwrite. If file doesn't exist, fail.
    Overwrite = 0x00000004,
    /// If file exists, overwrite. If file doesn't exist, create.
    OverwriteIf = 0x00000005,
}

impl TryFrom<u32> for CreateDisposition {
    type Error = crate::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x00000000 => Ok(CreateDisposition::Supersede),
            0x00000001 => Ok(CreateDisposition::Open),
            0x00000002 => Ok(CreateDisposition::Create),
            0x00000003 => Ok(CreateDisposition::OpenIf),
            0x00000004 => Ok(CreateDisposition::Overwrite),
            0x00000005 => Ok(CreateDisposition::OverwriteIf),
            _ => Err(crate::Error::ParseError(format!(
                "Invalid create disposition: {}",
                value
            ))),
        }
    }
}

/// Create action constants (returned by the server)
pub mod create_action {
    pub const SUPERSEDED: u32 = 0x00000000;
    pub const OPENED: u32 = 0x00000001;
    pub const CREATED: u32 = 0x00000002;
    pub const OVERWRITTEN: u32 = 0x00000003;
}

/// Query Directory flags
pub mod query_directory_flags {
    pub const RESTART_SCANS: u8 = 0x01;
    pub const RETURN_SINGLE_ENTRY: u8 = 0x02;
    pub const INDEX_SPECIFIED: u8 = 0x04;
    pub const REOPEN: u8 = 0x10;
}

bitflags! {
    /// File create options
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u32 {
        const FILE_DIRECTORY_FILE            = 0x00000001;
        const FILE_WRITE_THROUGH             = 0x00000002;
        const FILE_SEQUENTIAL_ONLY           = 0x00000004;
        const FILE_NO_INTERMEDIATE_BUFFERING = 0x00000008;
        const FILE_SYNCHRONOUS_IO_ALERT      = 0x00000010;
        const FILE_SYNCHRONOUS_IO_NONALERT   = 0x00000020;
        const FILE_NON_DIRECTORY_FILE        = 0x00000040;
        const FILE_NO_EA_KNOWLEDGE           = 0x00000200;
        const FILE_RANDOM_ACCESS             = 0x00000800;
        const FILE_DELETE_ON_CLOSE           = 0x00001000;
        const FILE_OPEN_BY_FILE_ID           = 0x00002000;
        const FILE_OPEN_FOR_BACKUP_INTENT    = 0x00004000;
        const FILE_OPEN_REPARSE_POINT        = 0x00200000;
    }
}

/// Impersonation levels
pub mod impersonation_level {
    pub const ANONYMOUS: u32 = 0x00000000;
    pub const IDENTIFICATION: u32 = 0x00000001;
    pub const IMPERSONATION: u32 = 0x00000002;
    pub const DELEGATION: u32 = 0x00000003;
}

/// Oplock levels (carried, never requested)
pub mod oplock_level {
    pub const NONE: u8 = 0x00;
}

/// SMB2 Commands (opcodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Smb2Command {
    Negotiate = 0x00,
    SessionSetup = 0x01,
    Logoff = 0x02,
    TreeConnect = 0x03,
    TreeDisconnect = 0x04,
    Create = 0x05,
    Close = 0x06,
    Flush = 0x07,
    Read = 0x08,
    Write = 0x09,
    Lock = 0x0A,
    Ioctl = 0x0B,
    Cancel = 0x0C,
    Echo = 0x0D,
    QueryDirectory = 0x0E,
    ChangeNotify = 0x0F,
    QueryInfo = 0x10,
    SetInfo = 0x11,
    OplockBreak = 0x12,
}

impl TryFrom<u16> for Smb2Command {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Negotiate),
            0x01 => Ok(Self::SessionSetup),
            0x02 => Ok(Self::Logoff),
            0x03 => Ok(Self::TreeConnect),
            0x04 => Ok(Self::TreeDisconnect),
            0x05 => Ok(Self::Create),
            0x06 => Ok(Self::Close),
            0x07 => Ok(Self::Flush),
            0x08 => Ok(Self::Read),
            0x09 => Ok(Self::Write),
            0x0A => Ok(Self::Lock),
            0x0B => Ok(Self::Ioctl),
            0x0C => Ok(Self::Cancel),
            0x0D => Ok(Self::Echo),
            0x0E => Ok(Self::QueryDirectory),
            0x0F => Ok(Self::ChangeNotify),
            0x10 => Ok(Self::QueryInfo),
            0x11 => Ok(Self::SetInfo),
            0x12 => Ok(Self::OplockBreak),
            _ => Err(crate::Error::ParseError(format!(
                "Invalid SMB2 command: 0x{:04x}",
                value
            ))),
        }
    }
}

bitflags! {
    /// SMB2 negotiate security mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityMode: u16 {
        const SIGNING_ENABLED = 0x0001;
        const SIGNING_REQUIRED = 0x0002;
    }
}

bitflags! {
    /// SMB2 capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Smb2Capabilities: u32 {
        const DFS = 0x00000001;
        const LEASING = 0x00000002;
        const LARGE_MTU = 0x00000004;
        const MULTI_CHANNEL = 0x00000008;
        const PERSISTENT_HANDLES = 0x00000010;
        const DIRECTORY_LEASING = 0x00000020;
        const ENCRYPTION = 0x00000040;
    }
}

bitflags! {
    /// Session flags returned by SESSION_SETUP
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionFlags: u16 {
        const IS_GUEST = 0x0001;
        const IS_NULL = 0x0002;
        const ENCRYPT_DATA = 0x0004;
    }
}

/// Share types returned by TREE_CONNECT
pub mod share_type {
    pub const DISK: u8 = 0x01;
    pub const PIPE: u8 = 0x02;
    pub const PRINT: u8 = 0x03;
}

/// SMB2 dialect versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum Smb2Dialect {
    Smb202 = 0x0202,
    Smb210 = 0x0210,
    Smb300 = 0x0300,
    Smb302 = 0x0302,
    Smb311 = 0x0311,
}

impl TryFrom<u16> for Smb2Dialect {
    type Error = crate::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0202 => Ok(Self::Smb202),
            0x0210 => Ok(Self::Smb210),
            0x0300 => Ok(Self::Smb300),
            0x0302 => Ok(Self::Smb302),
            0x0311 => Ok(Self::Smb311),
            _ => Err(crate::Error::UnsupportedProtocol(format!(
                "Unknown SMB2 dialect: 0x{:04x}",
                value
            ))),
        }
    }
}

bitflags! {
    /// SMB2 close flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CloseFlags: u16 {
        const POSTQUERY_ATTRIB = 0x0001;
    }
}

/// QUERY_INFO / SET_INFO info types
pub mod info_type {
    pub const FILE: u8 = 0x01;
    pub const FILESYSTEM: u8 = 0x02;
    pub const SECURITY: u8 = 0x03;
    pub const QUOTA: u8 = 0x04;
}

/// File and filesystem information classes used by the client
pub mod info_class {
    pub const FILE_DIRECTORY_INFORMATION: u8 = 0x01;
    pub const FILE_BASIC_INFORMATION: u8 = 0x04;
    pub const FILE_STANDARD_INFORMATION: u8 = 0x05;
    pub const FILE_RENAME_INFORMATION: u8 = 0x0A;
    pub const FILE_DISPOSITION_INFORMATION: u8 = 0x0D;
    pub const FILE_ALL_INFORMATION: u8 = 0x12;
    pub const FILE_END_OF_FILE_INFORMATION: u8 = 0x14;
    pub const FILE_ID_FULL_DIRECTORY_INFORMATION: u8 = 0x26;

    pub const FILE_FS_SIZE_INFORMATION: u8 = 0x03;
    pub const FILE_FS_FULL_SIZE_INFORMATION: u8 = 0x07;
}

/// IOCTL control codes
pub mod fsctl {
    pub const PIPE_TRANSCEIVE: u32 = 0x0011C017;
    pub const DFS_GET_REFERRALS: u32 = 0x00060194;
    /// SMB2_0_IOCTL_IS_FSCTL
    pub const IS_FSCTL: u32 = 0x00000001;
}
