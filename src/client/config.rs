//! Client configuration

use crate::protocol::smb2_constants::{SecurityMode, Smb2Capabilities, Smb2Dialect};
use crate::transport::SMB_PORT;
use std::time::Duration;
use uuid::Uuid;

/// Credits asked for in every request header
pub const DEFAULT_CREDIT_REQUEST: u16 = 32;

/// Upper bound on a single READ or WRITE, whatever the server offers
pub const MAX_IO_SIZE: u32 = 1024 * 1024;

/// SMB client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client GUID sent in NEGOTIATE
    pub client_guid: Uuid,
    /// Offered dialects, lowest first
    pub dialects: Vec<Smb2Dialect>,
    pub security_mode: SecurityMode,
    pub capabilities: Smb2Capabilities,
    pub user: String,
    pub password: String,
    pub domain: String,
    pub workstation: String,
    /// Request encryption; refused at connect time
    pub seal: bool,
    /// Bounds the TCP connect and every blocking `wait()`
    pub timeout: Option<Duration>,
    pub port: u16,
    pub credit_request: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_guid: Uuid::new_v4(),
            dialects: vec![
                Smb2Dialect::Smb202,
                Smb2Dialect::Smb210,
                Smb2Dialect::Smb300,
                Smb2Dialect::Smb302,
            ],
            security_mode: SecurityMode::SIGNING_ENABLED,
            capabilities: Smb2Capabilities::LARGE_MTU,
            user: String::new(),
            password: String::new(),
            domain: String::new(),
            workstation: String::from("RUST-SMB-CLIENT"),
            seal: false,
            timeout: Some(Duration::from_secs(30)),
            port: SMB_PORT,
            credit_request: DEFAULT_CREDIT_REQUEST,
        }
    }
}
