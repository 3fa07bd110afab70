//! End-to-end session scenarios
//!
//! Connect, attach, detach and disconnect against the fake server, both
//! blocking and from a tokio `LocalSet`.

use super::fake_server::{FakeServer, DISK_SHARE};
use super::test_context::{TestContext, TEST_TIMEOUT};
use crate::client::{Context, OpenFlags, SessionState};
use crate::protocol::smb2_constants::Smb2Command;
use crate::protocol::NtStatus;

#[cfg(test)]
mod tests {
    use super::*;

    fn count(commands: &[Smb2Command], command: Smb2Command) -> usize {
        commands.iter().filter(|c| **c == command).count()
    }

    #[test]
    fn test_full_session_lifecycle() {
        let test = TestContext::new();
        let ctx = &test.ctx;

        // 1. Negotiated limits come from the server
        assert_eq!(ctx.max_read_size(), 65536);
        assert_eq!(ctx.max_write_size(), 65536);

        // 2. The session is usable
        ctx.echo().wait().unwrap();

        // 3. Tear everything down
        ctx.disconnect_share().wait().unwrap();
        assert_eq!(ctx.state(), SessionState::Disconnected);
        assert_eq!(ctx.connection().pending_calls(), 0);

        let commands = test.server.commands();
        assert_eq!(
            &commands[..],
            &[
                Smb2Command::Negotiate,
                Smb2Command::SessionSetup,
                Smb2Command::SessionSetup,
                Smb2Command::TreeConnect,
                Smb2Command::Echo,
                Smb2Command::TreeDisconnect,
                Smb2Command::Logoff,
            ]
        );
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let test = TestContext::new();
        let ctx = &test.ctx;

        ctx.disconnect_share().wait().unwrap();
        ctx.connect_share(&test.server.address(), DISK_SHARE, None)
            .wait()
            .unwrap();
        assert_eq!(ctx.state(), SessionState::ShareAttached);
        ctx.echo().wait().unwrap();

        assert_eq!(count(&test.server.commands(), Smb2Command::Negotiate), 2);
        ctx.disconnect_share().wait().unwrap();
    }

    #[test]
    fn test_detach_keeps_session() {
        let test = TestContext::new();
        let ctx = &test.ctx;

        ctx.detach_share().wait().unwrap();
        assert_eq!(ctx.state(), SessionState::Connected);

        ctx.attach_share(DISK_SHARE).wait().unwrap();
        assert_eq!(ctx.state(), SessionState::ShareAttached);

        let commands = test.server.commands();
        assert_eq!(count(&commands, Smb2Command::Negotiate), 1);
        assert_eq!(count(&commands, Smb2Command::SessionSetup), 2);
        assert_eq!(count(&commands, Smb2Command::TreeConnect), 2);
        assert_eq!(count(&commands, Smb2Command::TreeDisconnect), 1);
    }

    #[test]
    fn test_unknown_share() {
        let server = FakeServer::start();
        let ctx = Context::new();
        ctx.set_timeout(Some(TEST_TIMEOUT));

        let err = ctx
            .connect_share(&server.address(), "nosuch", None)
            .wait()
            .unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::BAD_NETWORK_NAME));
        assert_ne!(ctx.state(), SessionState::ShareAttached);
        assert!(!ctx.error().is_empty());

        // The session survives; a good share still attaches
        ctx.attach_share(DISK_SHARE).wait().unwrap();
        assert_eq!(ctx.state(), SessionState::ShareAttached);
        ctx.disconnect_share().wait().unwrap();
    }

    #[test]
    fn test_connection_refused() {
        // Bind and drop a listener to find a port nobody serves
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let ctx = Context::new();
        ctx.set_timeout(Some(TEST_TIMEOUT));

        let result = ctx
            .connect_share(&format!("127.0.0.1:{}", port), DISK_SHARE, None)
            .wait();
        assert!(result.is_err());
        assert_ne!(ctx.state(), SessionState::ShareAttached);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_async_session() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let test = TestContext::new_async().await;
                let ctx = &test.ctx;
                assert_eq!(ctx.state(), SessionState::ShareAttached);

                ctx.echo().await.unwrap();

                let handle = ctx
                    .open("async.txt", OpenFlags::WRITE | OpenFlags::CREATE)
                    .await
                    .unwrap();
                assert_eq!(handle.write(b"from the event loop").await.unwrap(), 19);
                handle.close().await.unwrap();
                assert_eq!(test.read_file("async.txt"), b"from the event loop");

                ctx.disconnect_share().await.unwrap();
                assert_eq!(ctx.state(), SessionState::Disconnected);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_async_concurrent_calls() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let test = TestContext::new_async().await;
                let ctx = &test.ctx;
                test.write_file("a.txt", b"aaaa");
                test.write_file("b.txt", b"bbbbbbbb");

                // Both compounds are on the wire before either completes
                let (a, b) = tokio::join!(ctx.stat("a.txt"), ctx.stat("b.txt"));
                assert_eq!(a.unwrap().size, 4);
                assert_eq!(b.unwrap().size, 8);
                assert_eq!(ctx.connection().pending_calls(), 0);

                ctx.disconnect_share().await.unwrap();
            })
            .await;
    }
}
