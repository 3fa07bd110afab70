//! SMB2 client in Rust
//!
//! An event-driven SMB2/SMB3 client engine: request/reply correlation,
//! compounding, a pluggable scheduler hook and a session/share facade with
//! file, directory and share-enumeration operations.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod dcerpc;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod url;

#[cfg(feature = "client")]
pub mod client;

#[cfg(all(test, feature = "client"))]
mod e2e_tests;

pub use error::{Error, Result};
pub use url::SmbUrl;

#[cfg(feature = "client")]
pub use client::{Call, ClientConfig, Context, FileHandle, OpenFlags, SessionState};
