//! NEGOTIATE, SESSION_SETUP, TREE_CONNECT and LOGOFF chains.
//!
//! Each step queues one command and hands its outcome to `next` from inside
//! the completion, so a whole login is one continuation chain.

use super::config::MAX_IO_SIZE;
use super::connection::{Connection, Negotiated, SessionState};
use super::context::annotate;
use crate::auth::{AnonymousNtlmssp, Authenticator};
use crate::error::{Error, Result};
use crate::protocol::messages::{
    Smb2NegotiateRequest, Smb2SessionSetupRequest, Smb2TreeConnectRequest,
};
use crate::protocol::smb2_constants::{SecurityMode, SessionFlags};
use crate::protocol::{NtStatus, Reply, Request};
use tracing::{debug, info, warn};

/// Continuation run once a step has finished
pub(crate) type Step<T> = Box<dyn FnOnce(&mut Connection, Result<T>)>;

/// Negotiate and log on, skipping whatever is already done
pub(crate) fn ensure_session(conn: &mut Connection, next: Step<()>) {
    if conn.config.seal {
        next(conn, Err(Error::NotImplemented("sealing".into())));
    } else if conn.negotiated.dialect.is_none() {
        negotiate(
            conn,
            Box::new(move |conn, result| match result {
                Ok(()) => ensure_session(conn, next),
                Err(e) => next(conn, Err(e)),
            }),
        );
    } else if !conn.logged_on {
        logon(conn, next);
    } else {
        next(conn, Ok(()));
    }
}

/// Negotiate and log on if needed, then connect the tree for `share`
pub(crate) fn establish(conn: &mut Connection, share: String, next: Step<()>) {
    ensure_session(
        conn,
        Box::new(move |conn, result| match result {
            Ok(()) => tree_connect(conn, share, next),
            Err(e) => next(conn, Err(e)),
        }),
    );
}

fn negotiate(conn: &mut Connection, next: Step<()>) {
    let config = &conn.config;
    let mut request = Smb2NegotiateRequest::new(config.dialects.clone(), config.client_guid);
    request.security_mode = config.security_mode;
    request.capabilities = config.capabilities;

    let mut pdu = conn.build_pdu(Request::Negotiate(request));
    pdu.on_complete(move |conn, result| {
        let outcome = result
            .and_then(|response| expect_reply!(response, Negotiate))
            .map(|reply| {
                if reply.security_mode.contains(SecurityMode::SIGNING_REQUIRED) {
                    warn!("{} requires signing; requests will go out unsigned", conn.server);
                }
                debug!(
                    "negotiated {:?} with {} (read {}, write {}, transact {})",
                    reply.dialect_revision,
                    conn.server,
                    reply.max_read_size,
                    reply.max_write_size,
                    reply.max_transact_size
                );
                conn.negotiated = Negotiated {
                    dialect: Some(reply.dialect_revision),
                    server_guid: reply.server_guid,
                    max_transact_size: reply.max_transact_size.min(MAX_IO_SIZE),
                    max_read_size: reply.max_read_size.min(MAX_IO_SIZE),
                    max_write_size: reply.max_write_size.min(MAX_IO_SIZE),
                };
            });
        next(conn, outcome);
    });
    conn.submit(pdu);
}

/// Authenticator for one logon, put back afterwards if the caller owns it
struct Logon {
    auth: Box<dyn Authenticator>,
    supplied: bool,
}

impl Logon {
    fn done(self, conn: &mut Connection, result: Result<()>, next: Step<()>) {
        if self.supplied {
            conn.authenticator = Some(self.auth);
        }
        if result.is_err() {
            conn.session_id = 0;
        }
        next(conn, result);
    }
}

fn logon(conn: &mut Connection, next: Step<()>) {
    let mut logon = match conn.authenticator.take() {
        Some(auth) => Logon {
            auth,
            supplied: true,
        },
        None if !conn.config.password.is_empty() => {
            next(
                conn,
                Err(Error::NotImplemented(
                    "password logon without an Authenticator".into(),
                )),
            );
            return;
        }
        None => Logon {
            auth: Box::new(AnonymousNtlmssp::new(
                &conn.config.domain,
                &conn.config.user,
                &conn.config.workstation,
            )),
            supplied: false,
        },
    };

    debug!("session setup using {}", logon.auth.mechanism());
    match logon.auth.initial_token() {
        Ok(token) => session_setup(conn, logon, token, next),
        Err(e) => logon.done(conn, Err(e), next),
    }
}

fn session_setup(conn: &mut Connection, mut logon: Logon, token: Vec<u8>, next: Step<()>) {
    let mut request = Smb2SessionSetupRequest::new(token);
    request.security_mode = conn.config.security_mode;

    let mut pdu = conn.build_pdu(Request::SessionSetup(request));
    pdu.on_complete(move |conn, result| {
        let response = match result {
            Ok(response) => response,
            Err(e) => return logon.done(conn, Err(annotate(e, || "session setup".into())), next),
        };
        conn.session_id = response.session_id;
        let status = response.status;
        let reply = match expect_reply!(response, SessionSetup) {
            Ok(reply) => reply,
            Err(e) => return logon.done(conn, Err(e), next),
        };

        if status == NtStatus::MORE_PROCESSING_REQUIRED {
            match logon.auth.respond(&reply.security_blob) {
                Ok(token) => session_setup(conn, logon, token, next),
                Err(e) => logon.done(conn, Err(e), next),
            }
            return;
        }

        conn.logged_on = true;
        info!(
            "logged on to {} (session 0x{:x}{})",
            conn.server,
            conn.session_id,
            if reply.session_flags.contains(SessionFlags::IS_GUEST) {
                ", guest"
            } else {
                ""
            }
        );
        logon.done(conn, Ok(()), next);
    });
    conn.submit(pdu);
}

fn tree_connect(conn: &mut Connection, share: String, next: Step<()>) {
    let request = Smb2TreeConnectRequest::for_share(&conn.server, &share);
    let mut pdu = conn.build_pdu(Request::TreeConnect(request));
    pdu.on_complete(move |conn, result| {
        let outcome = result.and_then(|response| {
            let tree_id = response.tree_id;
            expect_reply!(response, TreeConnect).map(|_| tree_id)
        });
        match outcome {
            Ok(tree_id) => {
                info!("attached \\\\{}\\{} as tree 0x{:x}", conn.server, share, tree_id);
                conn.tree_id = tree_id;
                conn.share = Some(share);
                conn.state = SessionState::ShareAttached;
                next(conn, Ok(()));
            }
            Err(e) => {
                let server = conn.server.clone();
                next(
                    conn,
                    Err(annotate(e, || format!("tree connect \\\\{}\\{}", server, share))),
                );
            }
        }
    });
    conn.submit(pdu);
}

/// TREE_DISCONNECT of the attached share
pub(crate) fn tree_disconnect(conn: &mut Connection, next: Step<()>) {
    let mut pdu = conn.build_pdu(Request::TreeDisconnect);
    pdu.on_complete(move |conn, result| {
        let outcome = result.and_then(|response| match response.reply {
            Reply::TreeDisconnect => Ok(()),
            other => Err(Error::Protocol(format!(
                "expected TreeDisconnect reply, got {:?}",
                other.command()
            ))),
        });
        if outcome.is_ok() {
            debug!("detached tree 0x{:x}", conn.tree_id);
            conn.tree_id = 0;
            conn.share = None;
            conn.state = SessionState::Connected;
        }
        next(conn, outcome);
    });
    conn.submit(pdu);
}

/// LOGOFF of the current session
pub(crate) fn logoff(conn: &mut Connection, next: Step<()>) {
    let mut pdu = conn.build_pdu(Request::Logoff);
    pdu.on_complete(move |conn, result| {
        let outcome = result.map(|_| ());
        if outcome.is_ok() {
            debug!("logged off session 0x{:x}", conn.session_id);
        }
        conn.logged_on = false;
        next(conn, outcome);
    });
    conn.submit(pdu);
}
