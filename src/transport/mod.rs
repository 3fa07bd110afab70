//! Transport layer for SMB protocol
//!
//! Direct-TCP framing plus a non-blocking socket. The transport never waits
//! on its own: the connection reads and writes only when the host scheduler
//! reports readiness.

pub mod framing;
pub mod tcp;

pub use framing::{encode_frame, split_frame};
pub use tcp::TcpTransport;

/// Well-known Direct-TCP port
pub const SMB_PORT: u16 = 445;
