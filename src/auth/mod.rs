//! Authentication mechanisms for SMB
//!
//! Session setup carries security tokens opaquely. An [`Authenticator`]
//! produces the client's tokens; the built-in [`AnonymousNtlmssp`] performs a
//! null-session NTLMSSP logon without any key material.

pub mod ntlmssp;

pub use ntlmssp::AnonymousNtlmssp;

use crate::error::Result;

/// Source of SESSION_SETUP security tokens
pub trait Authenticator {
    /// Human readable mechanism name for logging
    fn mechanism(&self) -> &'static str;

    /// Token carried by the first SESSION_SETUP request
    fn initial_token(&mut self) -> Result<Vec<u8>>;

    /// Token answering the blob of a `STATUS_MORE_PROCESSING_REQUIRED` reply
    fn respond(&mut self, server_token: &[u8]) -> Result<Vec<u8>>;
}
