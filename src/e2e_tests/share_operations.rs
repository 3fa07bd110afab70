//! Share enumeration over the srvsvc pipe

use super::fake_server::{FakeServer, ServerOptions, DISK_SHARE};
use super::test_context::{TestContext, TEST_TIMEOUT};
use crate::client::{Context, OpenFlags, SessionState};
use crate::dcerpc::srvsvc::share_type;
use crate::error::Error;
use crate::protocol::smb2_constants::Smb2Command;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_enum() {
        let test = TestContext::new();

        let shares = test.ctx.share_enum().wait().unwrap();
        assert_eq!(shares.shares.len(), 2);

        let disk = &shares.shares[0];
        assert_eq!(disk.name, DISK_SHARE);
        assert_eq!(disk.base_type(), share_type::DISKTREE);
        assert_eq!(disk.comment, "Test share");

        let ipc = &shares.shares[1];
        assert_eq!(ipc.name, "IPC$");
        assert_eq!(ipc.base_type(), share_type::IPC);
        assert!(ipc.is_hidden());
    }

    #[test]
    fn test_share_enum_leaves_share_attached() {
        let test = TestContext::new();
        let tree_id = test.ctx.connection().tree_id;

        test.ctx.share_enum().wait().unwrap();
        assert_eq!(test.ctx.state(), SessionState::ShareAttached);
        assert_eq!(test.ctx.connection().tree_id, tree_id);

        // The disk share still works
        let handle = test
            .ctx
            .open("after-enum.txt", OpenFlags::WRITE | OpenFlags::CREATE)
            .wait()
            .unwrap();
        handle.write(b"ok").wait().unwrap();
        handle.close().wait().unwrap();
        assert_eq!(test.read_file("after-enum.txt"), b"ok");

        let commands = test.server.commands();
        let count = |cmd| commands.iter().filter(|c| **c == cmd).count();
        assert_eq!(count(Smb2Command::TreeConnect), 2);
        assert_eq!(count(Smb2Command::TreeDisconnect), 1);
        assert_eq!(count(Smb2Command::Ioctl), 1);
    }

    #[test]
    fn test_share_enum_without_share() {
        let server = FakeServer::start();
        let ctx = Context::new();
        ctx.set_timeout(Some(TEST_TIMEOUT));
        ctx.connect(&server.address()).unwrap();
        assert_eq!(ctx.state(), SessionState::Connected);

        // Logs on by itself
        let shares = ctx.share_enum().wait().unwrap();
        assert!(shares.shares.iter().any(|s| s.name == DISK_SHARE));
        assert_eq!(ctx.state(), SessionState::Connected);

        ctx.disconnect_share().wait().unwrap();
    }

    #[test]
    fn test_share_get_info() {
        let test = TestContext::new();

        let info = test.ctx.share_get_info(DISK_SHARE).wait().unwrap();
        assert_eq!(info.name, DISK_SHARE);
        assert_eq!(info.comment, "Test share");

        let err = test.ctx.share_get_info("missing").wait().unwrap_err();
        assert!(matches!(err, Error::Rpc(_)), "unexpected error: {:?}", err);
        assert_eq!(test.ctx.state(), SessionState::ShareAttached);
        assert_eq!(test.ctx.connection().pending_calls(), 0);
    }

    #[test]
    fn test_fragmented_reply() {
        // Small RPC fragments, handed out a few bytes per pipe read
        let test = TestContext::with_options(ServerOptions {
            rpc_fragment: 24,
            pipe_chunk: 40,
            ..ServerOptions::default()
        });

        let shares = test.ctx.share_enum().wait().unwrap();
        let names: Vec<&str> = shares.shares.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, [DISK_SHARE, "IPC$"]);

        let commands = test.server.commands();
        assert!(
            commands.iter().filter(|c| **c == Smb2Command::Read).count() > 2,
            "expected follow-up pipe reads"
        );
    }
}
