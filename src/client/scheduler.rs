//! tokio integration
//!
//! [`TokioScheduler`] implements [`EventHooks`] by running one `spawn_local`
//! task per subscribed descriptor. The task waits on an [`AsyncFd`] for the
//! readiness the connection asked for and calls `service()`; it holds only a
//! `Weak` reference, since the connection owns the scheduler.
//!
//! A descriptor number can come back for a different socket (teardown then
//! reconnect), so every `Add` starts a fresh task. That task waits for its
//! predecessor to drop its `AsyncFd` before registering with the reactor.

use super::connection::Connection;
use super::context::parent;
use super::pending::{EventHooks, FdChange, Readiness};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Descriptor owned by the connection, watched here
struct WatchedFd(RawFd);

impl AsRawFd for WatchedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Shared between the hooks and the task for one subscription
struct WatchState {
    active: Cell<bool>,
    interest: Cell<Readiness>,
    wake: Notify,
    exited: Cell<bool>,
    exit: Notify,
}

impl WatchState {
    fn new() -> Self {
        Self {
            active: Cell::new(true),
            interest: Cell::new(Readiness::READABLE | Readiness::WRITABLE),
            wake: Notify::new(),
            exited: Cell::new(false),
            exit: Notify::new(),
        }
    }

    fn retire(&self) {
        self.active.set(false);
        self.wake.notify_one();
    }
}

/// Event hooks backed by the current tokio `LocalSet`
pub struct TokioScheduler {
    conn: Weak<RefCell<Connection>>,
    watches: HashMap<RawFd, Rc<WatchState>>,
}

impl TokioScheduler {
    pub fn new(conn: Weak<RefCell<Connection>>) -> Self {
        Self {
            conn,
            watches: HashMap::new(),
        }
    }
}

impl EventHooks for TokioScheduler {
    fn change_fd(&mut self, fd: RawFd, change: FdChange) {
        trace!("tokio scheduler: fd {} {:?}", fd, change);
        let previous = self.watches.remove(&fd);
        if let Some(previous) = &previous {
            previous.retire();
        }
        if change == FdChange::Add {
            let state = Rc::new(WatchState::new());
            self.watches.insert(fd, state.clone());
            tokio::task::spawn_local(watch(fd, state, previous, self.conn.clone()));
        }
    }

    fn change_events(&mut self, fd: RawFd, events: Readiness) {
        if let Some(state) = self.watches.get(&fd) {
            state.interest.set(events);
            state.wake.notify_one();
        }
    }
}

async fn watch(
    fd: RawFd,
    state: Rc<WatchState>,
    previous: Option<Rc<WatchState>>,
    conn: Weak<RefCell<Connection>>,
) {
    if let Some(previous) = previous {
        if !previous.exited.get() {
            previous.exit.notified().await;
        }
    }
    if state.active.get() {
        run(fd, &state, &conn).await;
    }
    state.exited.set(true);
    state.exit.notify_one();
    debug!("stopped watching fd {}", fd);
}

async fn run(fd: RawFd, state: &WatchState, conn: &Weak<RefCell<Connection>>) {
    let async_fd = match AsyncFd::with_interest(
        WatchedFd(fd),
        Interest::READABLE | Interest::WRITABLE,
    ) {
        Ok(async_fd) => async_fd,
        Err(e) => {
            warn!("cannot watch fd {}: {}", fd, e);
            return;
        }
    };
    debug!("watching fd {}", fd);

    while state.active.get() {
        let interest = state.interest.get();
        tokio::select! {
            guard = async_fd.readable(), if interest.contains(Readiness::READABLE) => {
                let mut guard = match guard {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!("readiness error on fd {}: {}", fd, e);
                        return;
                    }
                };
                if !state.active.get() {
                    break;
                }
                let rc = parent(conn);
                let mut c = rc.borrow_mut();
                if !c.is_closed() {
                    // Errors already reached every completion.
                    let _ = c.service(Readiness::READABLE);
                }
                // service() reads until the socket would block.
                guard.clear_ready();
                state.interest.set(c.which_events());
            }
            guard = async_fd.writable(), if interest.contains(Readiness::WRITABLE) => {
                let mut guard = match guard {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!("readiness error on fd {}: {}", fd, e);
                        return;
                    }
                };
                if !state.active.get() {
                    break;
                }
                let rc = parent(conn);
                let mut c = rc.borrow_mut();
                if !c.is_closed() {
                    let _ = c.service(Readiness::WRITABLE);
                }
                let events = c.which_events();
                // Still wanting to write means the socket buffer is full.
                if events.contains(Readiness::WRITABLE) {
                    guard.clear_ready();
                }
                state.interest.set(events);
            }
            _ = state.wake.notified() => {}
        }
    }
}
