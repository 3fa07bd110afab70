//! Event-driven SMB2 client
//!
//! [`Context`] is the entry point. It owns one [`Connection`] and exposes
//! session, share, file and directory operations that return [`Call`]s: await
//! them on a tokio `LocalSet` after [`Context::attach_tokio`], or block on
//! them with [`Call::wait`].

/// Take the body of a reply, turning a mismatched variant into a protocol error
macro_rules! expect_reply {
    ($response:expr, $variant:ident) => {
        match $response.reply {
            $crate::protocol::Reply::$variant(body) => Ok(body),
            other => Err($crate::error::Error::Protocol(format!(
                "expected {} reply, got {:?}",
                stringify!($variant),
                other.command()
            ))),
        }
    };
}

pub mod call;
pub mod config;
pub mod connection;
pub mod context;
pub mod dir;
pub mod file;
pub mod path_ops;
pub mod pdu;
pub mod pending;
pub mod scheduler;
mod session;
pub mod share_enum;

pub use call::Call;
pub use config::{ClientConfig, MAX_IO_SIZE};
pub use connection::{Connection, SessionState};
pub use context::Context;
pub use dir::{Dir, Dirent};
pub use file::{FileHandle, FileType, OpenFlags, Stat, Whence};
pub use path_ops::StatVfs;
pub use pdu::{Pdu, PduReply};
pub use pending::{EventHooks, FdChange, Readiness};
pub use scheduler::TokioScheduler;
pub use crate::dcerpc::srvsvc::{ShareEnum, ShareInfo};
