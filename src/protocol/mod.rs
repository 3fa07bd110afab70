//! SMB2 protocol definitions

pub mod codec;
pub mod messages;
pub mod smb2_constants;
pub mod status;

pub use codec::{Reply, Request, Response};
pub use status::NtStatus;
