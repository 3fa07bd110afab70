//! Protocol-level tests: compounding, generic calls, credits and transport
//! failure.

use super::fake_server::ServerOptions;
use super::test_context::{TestContext, TEST_TIMEOUT};
use crate::client::{Pdu, PduReply};
use crate::error::Error;
use crate::protocol::messages::{FileId, Smb2CloseRequest, Smb2CreateRequest};
use crate::protocol::smb2_constants::{CreateDisposition, Smb2Command};
use crate::protocol::{NtStatus, Reply, Request};
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(test)]
mod tests {
    use super::*;

    /// CREATE `name` with `disposition`, compounded with a CLOSE of the same handle
    fn create_and_close(test: &TestContext, name: &str, disposition: CreateDisposition) -> Pdu {
        let create = Smb2CreateRequest::new(name).disposition(disposition);
        let mut pdu = test.ctx.build_pdu(Request::Create(create));
        pdu.add_compound(
            test.ctx
                .build_pdu(Request::Close(Smb2CloseRequest::new(FileId::COMPOUND))),
        );
        pdu
    }

    #[test]
    fn test_compound_create_close() {
        let test = TestContext::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut create = test.ctx.build_pdu(Request::Create(
            Smb2CreateRequest::new("compound.txt").disposition(CreateDisposition::OpenIf),
        ));
        let mut close = test
            .ctx
            .build_pdu(Request::Close(Smb2CloseRequest::new(FileId::COMPOUND)));

        let seen = order.clone();
        create.on_complete(move |_, result| {
            let response = result.unwrap();
            assert!(matches!(response.reply, Reply::Create(_)));
            seen.borrow_mut().push(Smb2Command::Create);
        });
        let seen = order.clone();
        close.on_complete(move |_, result| {
            assert!(result.is_ok(), "close failed: {:?}", result.err());
            seen.borrow_mut().push(Smb2Command::Close);
        });
        create.add_compound(close);
        assert_eq!(create.len(), 2);

        test.ctx.queue_pdu(create).unwrap();
        // Replies arrive in order, so the echo completes after the compound
        test.ctx.echo().wait().unwrap();

        assert_eq!(&order.borrow()[..], &[Smb2Command::Create, Smb2Command::Close]);
        assert!(test.path("compound.txt").exists());
        let commands = test.server.commands();
        let create_at = commands.iter().position(|c| *c == Smb2Command::Create).unwrap();
        assert_eq!(commands[create_at + 1], Smb2Command::Close);
    }

    #[test]
    fn test_compound_failure_cascades() {
        let test = TestContext::new();

        let mut pdu = create_and_close(&test, "missing.txt", CreateDisposition::Open);
        let mut create_reply = pdu.completion();
        test.ctx.queue_pdu(pdu).unwrap();
        test.ctx.echo().wait().unwrap();

        let err = create_reply.try_take().expect("reply arrived").unwrap_err();
        assert_eq!(err.nt_status(), Some(NtStatus::OBJECT_NAME_NOT_FOUND));
        assert_eq!(test.ctx.connection().in_flight(), 0);
    }

    /// CREATE+CLOSE of `name`, returning the replies of both members
    fn queue_compound(test: &TestContext, name: &str) -> (PduReply, PduReply) {
        let mut create = test.ctx.build_pdu(Request::Create(
            Smb2CreateRequest::new(name).disposition(CreateDisposition::OpenIf),
        ));
        let create_reply = create.completion();
        let mut close = test
            .ctx
            .build_pdu(Request::Close(Smb2CloseRequest::new(FileId::COMPOUND)));
        let close_reply = close.completion();
        create.add_compound(close);

        test.ctx.queue_pdu(create).unwrap();
        assert_eq!(test.ctx.connection().pending_calls(), 2);
        (create_reply, close_reply)
    }

    #[test]
    fn test_wait_on_compound_replies() {
        let test = TestContext::new();

        let (create_reply, close_reply) = queue_compound(&test, "waited.txt");
        let create = create_reply.wait().unwrap();
        assert!(matches!(create.reply, Reply::Create(_)));
        let close = close_reply.wait().unwrap();
        assert!(matches!(close.reply, Reply::Close(_)));

        assert!(test.path("waited.txt").exists());
        assert_eq!(test.ctx.connection().pending_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_await_compound_replies() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let test = TestContext::new_async().await;

                // Nothing else is outstanding, so the queued PDU alone keeps
                // the descriptor subscribed
                let mut echo = test.ctx.build_pdu(Request::Echo);
                let echo_reply = echo.completion();
                test.ctx.queue_pdu(echo).unwrap();
                assert_eq!(test.ctx.connection().pending_calls(), 1);
                let response = tokio::time::timeout(TEST_TIMEOUT, echo_reply)
                    .await
                    .expect("echo reply arrived")
                    .unwrap();
                assert!(matches!(response.reply, Reply::Echo));

                let (create_reply, close_reply) = queue_compound(&test, "awaited.txt");
                let (create, close) = tokio::join!(create_reply, close_reply);
                assert!(matches!(create.unwrap().reply, Reply::Create(_)));
                assert!(matches!(close.unwrap().reply, Reply::Close(_)));
                assert!(test.path("awaited.txt").exists());
                assert_eq!(test.ctx.connection().pending_calls(), 0);

                test.ctx.disconnect_share().await.unwrap();
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    #[should_panic(expected = "no event loop to attach to")]
    async fn test_awaiting_reply_without_event_loop_asserts() {
        let test = TestContext::new();
        let mut pdu = test.ctx.build_pdu(Request::Echo);
        let reply = pdu.completion();
        test.ctx.queue_pdu(pdu).unwrap();
        let _ = reply.await;
    }

    #[test]
    #[should_panic(expected = "driven by an event loop")]
    fn test_waiting_on_reply_inside_event_loop_asserts() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, async {
            let test = TestContext::new_async().await;
            let mut pdu = test.ctx.build_pdu(Request::Echo);
            let reply = pdu.completion();
            test.ctx.queue_pdu(pdu).unwrap();
            let _ = reply.wait();
        });
    }

    #[test]
    fn test_generic_call() {
        let test = TestContext::new();

        let response = test.ctx.call(Request::Echo).wait().unwrap();
        assert!(matches!(response.reply, Reply::Echo));
        assert_eq!(response.status, NtStatus::SUCCESS);
        assert_eq!(response.session_id, test.ctx.connection().session_id);
    }

    #[test]
    fn test_call_async_callback() {
        let test = TestContext::new();
        let result = Rc::new(RefCell::new(None));

        let slot = result.clone();
        test.ctx.call_async(
            Request::Create(Smb2CreateRequest::new("nothing-here")),
            move |_, reply| {
                *slot.borrow_mut() = Some(reply.map(|r| r.status));
            },
        );
        test.ctx.echo().wait().unwrap();

        let outcome = result.borrow_mut().take().expect("callback ran");
        assert_eq!(
            outcome.unwrap_err().nt_status(),
            Some(NtStatus::OBJECT_NAME_NOT_FOUND)
        );
        assert_eq!(test.ctx.connection().pending_calls(), 0);
        assert!(test.ctx.error().contains("CREATE"));
    }

    #[test]
    fn test_single_credit_window() {
        let test = TestContext::with_options(ServerOptions {
            credits: 1,
            ..ServerOptions::default()
        });

        // Only one command fits the window at a time; the rest queue locally
        let calls: Vec<_> = (0..5).map(|_| test.ctx.echo()).collect();
        for call in calls {
            call.wait().unwrap();
        }
        assert_eq!(test.ctx.connection().in_flight(), 0);
        assert_eq!(test.ctx.connection().pending_calls(), 0);
    }

    #[test]
    fn test_server_hang_up() {
        let test = TestContext::with_options(ServerOptions {
            hang_up_on: Some(Smb2Command::Echo),
            ..ServerOptions::default()
        });

        let echo = test.ctx.echo();
        let stat = test.ctx.stat("anything");
        assert!(matches!(echo.wait(), Err(Error::ConnectionClosed)));
        assert!(matches!(stat.wait(), Err(Error::ConnectionClosed)));
        assert!(test.ctx.connection().is_closed());
        assert_eq!(test.ctx.connection().pending_calls(), 0);

        // A closed connection still tears down cleanly
        test.ctx.disconnect_share().wait().unwrap();
    }

    #[test]
    fn test_session_id_stamped() {
        let test = TestContext::new();
        let conn = test.ctx.connection();
        assert_ne!(conn.session_id, 0);
        assert_ne!(conn.tree_id, 0);
    }
}
