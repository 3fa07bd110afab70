//! Awaitable and blocking results of facade operations

use super::connection::Connection;
use super::pending::{CallToken, Readiness};
use crate::error::{Error, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::cell::RefCell;
use std::future::Future;
use std::os::fd::AsFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::trace;

/// Longest single poll(2) sleep; the deadline is rechecked after each
const POLL_SLICE: Duration = Duration::from_millis(1000);

/// Producer side of a [`Call`]: holds the registry token until finished
pub(crate) struct Completer<T> {
    token: CallToken,
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Completer<T> {
    /// Deliver the result and drop the call from the registry
    pub(crate) fn finish(self, conn: &mut Connection, result: Result<T>) {
        if let Err(e) = &result {
            conn.set_error(e);
        }
        conn.complete_call(self.token);
        // The caller may have dropped the Call; the result is then discarded.
        let _ = self.tx.send(result);
    }
}

/// Result of an operation that may still be on the wire.
///
/// Await it when the connection is attached to an event loop, or call
/// [`Call::wait`] to drive the connection from the current thread.
#[must_use = "a Call does nothing unless awaited or waited on"]
pub struct Call<T> {
    conn: Rc<RefCell<Connection>>,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Call<T> {
    /// Register a new call on `conn` and hand out both ends
    pub(crate) fn start(conn: &Rc<RefCell<Connection>>) -> (Completer<T>, Call<T>) {
        let token = conn.borrow_mut().register_call();
        let (tx, rx) = oneshot::channel();
        (
            Completer { token, tx },
            Call {
                conn: conn.clone(),
                rx,
            },
        )
    }

    /// A call whose result is known without touching the wire
    pub(crate) fn ready(conn: &Rc<RefCell<Connection>>, result: Result<T>) -> Call<T> {
        if let Err(e) = &result {
            conn.borrow_mut().set_error(e);
        }
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Call {
            conn: conn.clone(),
            rx,
        }
    }

    /// Block until the result arrives, servicing the connection meanwhile.
    ///
    /// Only legal on a connection without an event loop. Honours the
    /// configured timeout; on `Error::Timeout` the command stays outstanding
    /// and its eventual reply is discarded.
    pub fn wait(mut self) -> Result<T> {
        block_on(&self.conn, &mut self.rx)
    }
}

/// Drive `conn` from the current thread until `rx` yields
pub(crate) fn block_on<T>(
    conn: &Rc<RefCell<Connection>>,
    rx: &mut oneshot::Receiver<Result<T>>,
) -> Result<T> {
    let timeout = {
        let conn = conn.borrow();
        assert!(
            !conn.has_event_loop(),
            "wait() on a connection driven by an event loop"
        );
        conn.config.timeout
    };
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        match rx.try_recv() {
            Ok(result) => return result,
            Err(oneshot::error::TryRecvError::Closed) => return Err(Error::ConnectionClosed),
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::Timeout);
                }
                (deadline - now).min(POLL_SLICE)
            }
            None => POLL_SLICE,
        };

        let mut conn = conn.borrow_mut();
        if conn.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let ready = poll_once(&conn, slice)?;
        if !ready.is_empty() {
            trace!("poll reported {:?}", ready);
            // Failures also reach the completions; the loop picks them up.
            let _ = conn.service(ready);
        }
    }
}

/// Poll `rx`, asserting that an event loop will service `conn`
pub(crate) fn poll_reply<T>(
    conn: Option<&Rc<RefCell<Connection>>>,
    rx: &mut oneshot::Receiver<Result<T>>,
    cx: &mut TaskContext<'_>,
) -> Poll<Result<T>> {
    if let Some(conn) = conn {
        assert!(conn.borrow().has_event_loop(), "no event loop to attach to");
    }
    match Pin::new(rx).poll(cx) {
        Poll::Ready(Ok(result)) => Poll::Ready(result),
        Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
        Poll::Pending => Poll::Pending,
    }
}

/// Wait up to `slice` for the readiness the connection asks for
fn poll_once(conn: &Connection, slice: Duration) -> Result<Readiness> {
    let transport = conn.transport().ok_or(Error::NotConnected)?;
    let wanted = conn.which_events();
    let mut flags = PollFlags::empty();
    if wanted.contains(Readiness::READABLE) {
        flags |= PollFlags::POLLIN;
    }
    if wanted.contains(Readiness::WRITABLE) {
        flags |= PollFlags::POLLOUT;
    }

    let millis = slice.as_millis().min(u16::MAX as u128) as u16;
    let mut fds = [PollFd::new(transport.as_fd(), flags)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) => return Ok(Readiness::empty()),
        Ok(_) => {}
        Err(Errno::EINTR) => return Ok(Readiness::empty()),
        Err(e) => return Err(Error::Io(e.into())),
    }

    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
    let mut ready = Readiness::empty();
    if revents.contains(PollFlags::POLLIN) {
        ready |= Readiness::READABLE;
    }
    if revents.contains(PollFlags::POLLOUT) {
        ready |= Readiness::WRITABLE;
    }
    if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
        ready |= Readiness::HANGUP;
    }
    Ok(ready)
}

impl<T> Future for Call<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        poll_reply(Some(&this.conn), &mut this.rx, cx)
    }
}
