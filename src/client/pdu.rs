//! Queued SMB2 commands and their completion slots
//!
//! A [`Pdu`] owns one request record, or several when commands are
//! compounded. Queuing consumes it, so a PDU can never be sent twice; a PDU
//! that is dropped before being queued simply goes away without completing.
//! Every member that carries a completion enters the pending-call registry
//! when it is queued and leaves it when that completion fires.

use super::call::{block_on, poll_reply};
use super::connection::Connection;
use super::pending::CallToken;
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::Smb2Command;
use crate::protocol::{Request, Response};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::oneshot;

type Callback = Box<dyn FnOnce(&mut Connection, Result<Response>)>;

enum Target {
    Callback(Callback),
    Channel(oneshot::Sender<Result<Response>>),
}

/// Where the decoded reply of one command goes
pub(crate) struct Completion {
    target: Target,
    token: Option<CallToken>,
}

impl Completion {
    fn new(target: Target) -> Self {
        Self {
            target,
            token: None,
        }
    }

    /// Enter the pending-call registry
    pub(crate) fn register(&mut self, conn: &mut Connection) {
        if self.token.is_none() {
            self.token = Some(conn.register_call());
        }
    }

    pub(crate) fn fire(self, conn: &mut Connection, result: Result<Response>) {
        match self.target {
            Target::Callback(cb) => cb(conn, result),
            Target::Channel(tx) => {
                if let Err(e) = &result {
                    conn.set_error(e);
                }
                // Receiver gone means the caller stopped caring.
                let _ = tx.send(result);
            }
        }
        // Released after the callback so follow-up commands it queued keep
        // the descriptor subscribed.
        if let Some(token) = self.token {
            conn.complete_call(token);
        }
    }
}

/// One command of a (possibly compounded) PDU
pub(crate) struct Member {
    pub(crate) request: Request,
    pub(crate) completion: Option<Completion>,
    pub(crate) tree_id: Option<u32>,
}

/// One SMB2 command, plus any commands compounded behind it
pub struct Pdu {
    members: Vec<Member>,
    /// Set when built through a `Context`; lets the reply block or assert
    owner: Option<Rc<RefCell<Connection>>>,
}

impl Pdu {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            members: vec![Member {
                request,
                completion: None,
                tree_id: None,
            }],
            owner: None,
        }
    }

    pub(crate) fn owned_by(request: Request, owner: &Rc<RefCell<Connection>>) -> Self {
        let mut pdu = Self::new(request);
        pdu.owner = Some(owner.clone());
        pdu
    }

    pub fn command(&self) -> Smb2Command {
        self.members[0].request.command()
    }

    /// Number of commands in the chain, this one included
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append `next` and everything compounded behind it to this chain
    pub fn add_compound(&mut self, next: Pdu) {
        self.members.extend(next.members);
    }

    /// Send this command on a tree other than the connection's current one
    pub fn set_tree_id(&mut self, tree_id: u32) {
        self.members[0].tree_id = Some(tree_id);
    }

    /// Run `callback` with the decoded reply of this command
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut Connection, Result<Response>) + 'static,
    {
        self.set_completion(Completion::new(Target::Callback(Box::new(callback))));
    }

    /// Receive the decoded reply of this command through a channel
    pub fn completion(&mut self) -> PduReply {
        let (tx, rx) = oneshot::channel();
        self.set_completion(Completion::new(Target::Channel(tx)));
        PduReply {
            conn: self.owner.clone(),
            rx,
        }
    }

    fn set_completion(&mut self, completion: Completion) {
        let slot = &mut self.members[0].completion;
        assert!(slot.is_none(), "PDU already has a completion");
        *slot = Some(completion);
    }

    pub(crate) fn into_members(self) -> Vec<Member> {
        self.members
    }
}

/// Receiving end of [`Pdu::completion`]
///
/// Like a [`Call`](super::Call), a reply of a PDU built through
/// [`Context::build_pdu`](super::Context::build_pdu) is awaited in event-loop
/// mode and waited on otherwise.
#[must_use = "a PduReply does nothing unless awaited or waited on"]
pub struct PduReply {
    conn: Option<Rc<RefCell<Connection>>>,
    rx: oneshot::Receiver<Result<Response>>,
}

impl PduReply {
    /// Reply if it has already arrived
    pub fn try_take(&mut self) -> Option<Result<Response>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::ConnectionClosed)),
        }
    }

    /// Block until the reply arrives, servicing the connection meanwhile.
    ///
    /// Same rules as [`Call::wait`](super::Call::wait).
    pub fn wait(mut self) -> Result<Response> {
        let Some(conn) = self.conn.take() else {
            panic!("wait() on the reply of a PDU not built through a Context");
        };
        block_on(&conn, &mut self.rx)
    }
}

impl Future for PduReply {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        poll_reply(this.conn.as_ref(), &mut this.rx, cx)
    }
}
