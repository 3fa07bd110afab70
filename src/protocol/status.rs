//! NT status codes carried in SMB2 reply headers
//!
//! Every code the client knows about lives in one static table together with a
//! human readable text and the closest POSIX errno. Unknown codes still format
//! and map (to `EIO`), so a server can never produce an untranslatable status.

use nix::errno::Errno;
use std::fmt;

/// Severity bits (top two bits of every status code)
pub mod severity {
    pub const MASK: u32 = 0xC000_0000;
    pub const SUCCESS: u32 = 0x0000_0000;
    pub const INFO: u32 = 0x4000_0000;
    pub const WARNING: u32 = 0x8000_0000;
    pub const ERROR: u32 = 0xC000_0000;
}

/// A 32-bit NT status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub u32);

struct StatusEntry {
    status: NtStatus,
    name: &'static str,
    text: &'static str,
    errno: Errno,
}

macro_rules! status_table {
    ($($name:ident = $code:expr, $text:expr, $errno:ident;)*) => {
        impl NtStatus {
            $(pub const $name: NtStatus = NtStatus($code);)*
        }

        static STATUS_TABLE: &[StatusEntry] = &[
            $(StatusEntry {
                status: NtStatus($code),
                name: stringify!($name),
                text: $text,
                errno: Errno::$errno,
            },)*
        ];
    };
}

status_table! {
    SUCCESS = 0x0000_0000, "Success", UnknownErrno;
    CANCELLED = 0xFFFF_FFFF, "Cancelled", ECANCELED;
    PENDING = 0x0000_0103, "Pending", EAGAIN;
    SMB_BAD_FID = 0x0006_0001, "Bad file id", EBADF;
    BUFFER_OVERFLOW = 0x8000_0005, "Buffer overflow", EIO;
    NO_MORE_FILES = 0x8000_0006, "No more files", ENOENT;
    NOT_IMPLEMENTED = 0xC000_0002, "Not implemented", ENOSYS;
    INVALID_HANDLE = 0xC000_0008, "Invalid handle", EBADF;
    INVALID_PARAMETER = 0xC000_000D, "Invalid parameter", EINVAL;
    NO_SUCH_DEVICE = 0xC000_000E, "No such device", ENODEV;
    NO_SUCH_FILE = 0xC000_000F, "No such file", ENOENT;
    INVALID_DEVICE_REQUEST = 0xC000_0010, "Invalid device request", EINVAL;
    END_OF_FILE = 0xC000_0011, "End of file", EIO;
    NO_MEDIA_IN_DEVICE = 0xC000_0013, "No media in device", ENODEV;
    MORE_PROCESSING_REQUIRED = 0xC000_0016, "More processing required", EAGAIN;
    INVALID_LOCK_SEQUENCE = 0xC000_001E, "Invalid lock sequence", EINVAL;
    INVALID_VIEW_SIZE = 0xC000_001F, "Invalid view size", EINVAL;
    ALREADY_COMMITTED = 0xC000_0021, "Already committed", EACCES;
    ACCESS_DENIED = 0xC000_0022, "Access denied", EACCES;
    BUFFER_TOO_SMALL = 0xC000_0023, "Buffer too small", EINVAL;
    OBJECT_TYPE_MISMATCH = 0xC000_0024, "Object type mismatch", EINVAL;
    OBJECT_NAME_INVALID = 0xC000_0033, "Object name invalid", EINVAL;
    OBJECT_NAME_NOT_FOUND = 0xC000_0034, "Object name not found", ENOENT;
    OBJECT_NAME_COLLISION = 0xC000_0035, "Object name collision", EEXIST;
    PORT_DISCONNECTED = 0xC000_0037, "Port disconnected", EPIPE;
    OBJECT_PATH_INVALID = 0xC000_0039, "Object path invalid", ENOTDIR;
    OBJECT_PATH_NOT_FOUND = 0xC000_003A, "Object path not found", ENOENT;
    OBJECT_PATH_SYNTAX_BAD = 0xC000_003B, "Object path syntax bad", EINVAL;
    DATA_ERROR = 0xC000_003E, "Data error", EIO;
    CRC_ERROR = 0xC000_003F, "CRC error", EIO;
    SECTION_TOO_BIG = 0xC000_0040, "Section too big", EIO;
    PORT_CONNECTION_REFUSED = 0xC000_0041, "Port connection refused", ECONNREFUSED;
    INVALID_PORT_HANDLE = 0xC000_0042, "Invalid port handle", EBADF;
    SHARING_VIOLATION = 0xC000_0043, "Sharing violation", EBUSY;
    THREAD_IS_TERMINATING = 0xC000_004B, "Thread is terminating", EIO;
    FILE_LOCK_CONFLICT = 0xC000_0054, "File lock conflict", EAGAIN;
    LOCK_NOT_GRANTED = 0xC000_0055, "Lock not granted", EAGAIN;
    DELETE_PENDING = 0xC000_0056, "Delete pending", EPERM;
    PRIVILEGE_NOT_HELD = 0xC000_0061, "Privilege not held", EPERM;
    LOGON_FAILURE = 0xC000_006D, "Logon failure", EACCES;
    ACCOUNT_RESTRICTION = 0xC000_006E, "Account restriction", EACCES;
    INVALID_LOGON_HOURS = 0xC000_006F, "Invalid logon hours", EACCES;
    PASSWORD_EXPIRED = 0xC000_0071, "Password expired", EACCES;
    ACCOUNT_DISABLED = 0xC000_0072, "Account disabled", EACCES;
    DISK_FULL = 0xC000_007F, "Disk full", ENOSPC;
    TOO_MANY_PAGING_FILES = 0xC000_0097, "Too many paging files", ENOMEM;
    INSUFFICIENT_RESOURCES = 0xC000_009A, "Insufficient resources", ENOMEM;
    DFS_EXIT_PATH_FOUND = 0xC000_009B, "DFS exit path found", ENOENT;
    DEVICE_DATA_ERROR = 0xC000_009C, "Device data error", EIO;
    MEDIA_WRITE_PROTECTED = 0xC000_00A2, "Media write protected", EROFS;
    INVALID_PIPE_STATE = 0xC000_00AD, "Invalid pipe state", EPIPE;
    PIPE_BUSY = 0xC000_00AE, "Pipe busy", EBUSY;
    ILLEGAL_FUNCTION = 0xC000_00AF, "Illegal function", EINVAL;
    PIPE_DISCONNECTED = 0xC000_00B0, "Pipe disconnected", EPIPE;
    IO_TIMEOUT = 0xC000_00B5, "I/O timeout", ETIMEDOUT;
    FILE_IS_A_DIRECTORY = 0xC000_00BA, "File is a directory", EISDIR;
    NOT_SUPPORTED = 0xC000_00BB, "Not supported", EOPNOTSUPP;
    BAD_NETWORK_PATH = 0xC000_00BE, "Bad network path", ENOENT;
    NETWORK_NAME_DELETED = 0xC000_00C9, "Network name deleted", ECONNRESET;
    NETWORK_ACCESS_DENIED = 0xC000_00CA, "Network access denied", EACCES;
    BAD_NETWORK_NAME = 0xC000_00CC, "Bad network name", ENOENT;
    NOT_SAME_DEVICE = 0xC000_00D4, "Not same device", EXDEV;
    FILE_RENAMED = 0xC000_00D5, "File renamed", EIO;
    REDIRECTOR_NOT_STARTED = 0xC000_00FB, "Redirector not started", EIO;
    DIRECTORY_NOT_EMPTY = 0xC000_0101, "Directory not empty", ENOTEMPTY;
    NOT_A_DIRECTORY = 0xC000_0103, "Not a directory", ENOTDIR;
    PROCESS_IS_TERMINATING = 0xC000_010A, "Process is terminating", EIO;
    TOO_MANY_OPENED_FILES = 0xC000_011F, "Too many opened files", EMFILE;
    CANNOT_DELETE = 0xC000_0121, "Cannot delete", EPERM;
    FILE_DELETED = 0xC000_0123, "File deleted", ENOENT;
    FILE_CLOSED = 0xC000_0128, "File closed", EBADF;
    INSUFF_SERVER_RESOURCES = 0xC000_0205, "Insufficient server resources", ENOMEM;
    HANDLE_NOT_CLOSABLE = 0xC000_0235, "Handle not closable", EIO;
    HOST_UNREACHABLE = 0xC000_023D, "Host unreachable", EHOSTUNREACH;
    PROTOCOL_UNREACHABLE = 0xC000_023E, "Protocol unreachable", ECONNREFUSED;
    NOT_A_REPARSE_POINT = 0xC000_0275, "Not a reparse point", EINVAL;
}

impl NtStatus {
    fn entry(self) -> Option<&'static StatusEntry> {
        STATUS_TABLE.iter().find(|e| e.status == self)
    }

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn severity(self) -> u32 {
        self.0 & severity::MASK
    }

    pub fn is_success(self) -> bool {
        self == NtStatus::SUCCESS
    }

    pub fn is_error(self) -> bool {
        self.severity() == severity::ERROR
    }

    pub fn is_warning(self) -> bool {
        self.severity() == severity::WARNING
    }

    /// Symbolic name, e.g. `OBJECT_NAME_NOT_FOUND`
    pub fn name(self) -> Option<&'static str> {
        self.entry().map(|e| e.name)
    }

    pub fn text(self) -> &'static str {
        self.entry().map_or("Unknown status", |e| e.text)
    }

    /// Closest POSIX errno for this status
    pub fn errno(self) -> Errno {
        self.entry().map_or(Errno::EIO, |e| e.errno)
    }
}

impl From<u32> for NtStatus {
    fn from(value: u32) -> Self {
        NtStatus(value)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.text(), self.0)
    }
}
