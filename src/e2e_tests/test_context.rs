//! Test context for end-to-end testing
//!
//! Pairs a [`FakeServer`] with a client [`Context`] that is already attached
//! to its disk share.

use super::fake_server::{FakeServer, ServerOptions, DISK_SHARE};
use crate::client::{Context, SessionState};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestContext {
    pub server: FakeServer,
    pub ctx: Context,
}

impl TestContext {
    /// Blocking context: drive it with `Call::wait`
    pub fn new() -> Self {
        Self::with_options(ServerOptions::default())
    }

    pub fn with_options(options: ServerOptions) -> Self {
        let server = FakeServer::with_options(options);
        let ctx = Context::new();
        ctx.set_timeout(Some(TEST_TIMEOUT));
        ctx.connect_share(&server.address(), DISK_SHARE, Some("tester"))
            .wait()
            .expect("attach fake share");
        assert_eq!(ctx.state(), SessionState::ShareAttached);
        Self { server, ctx }
    }

    /// Event-loop context; must run inside a tokio `LocalSet`
    pub async fn new_async() -> Self {
        let server = FakeServer::start();
        let ctx = Context::new();
        ctx.set_timeout(Some(TEST_TIMEOUT));
        ctx.connect(&server.address()).expect("connect to fake server");
        ctx.attach_tokio();
        ctx.attach_share(DISK_SHARE).await.expect("attach fake share");
        Self { server, ctx }
    }

    /// Location of `name` inside the served directory
    pub fn path(&self, name: &str) -> PathBuf {
        self.server.root().join(name)
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) {
        fs::write(self.path(name), contents).expect("seed server file");
    }

    pub fn read_file(&self, name: &str) -> Vec<u8> {
        fs::read(self.path(name)).expect("read server file")
    }

    pub fn mkdir(&self, name: &str) {
        fs::create_dir_all(self.path(name)).expect("seed server directory");
    }
}
