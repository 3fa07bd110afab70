//! End-to-end tests against an in-process SMB2 server

pub mod fake_server;
pub mod test_context;

// Test scenario modules
pub mod directory_operations;
pub mod file_operations;
pub mod path_operations;
pub mod protocol_tests;
pub mod scenarios;
pub mod share_operations;

pub use fake_server::{FakeServer, ServerOptions};
pub use test_context::TestContext;
