//! Pending-call registry and host scheduler hooks
//!
//! The connection is registered with the host scheduler exactly while at
//! least one call is outstanding: the first call subscribes the socket, the
//! last completion unsubscribes it.

use bitflags::bitflags;
use std::collections::BTreeSet;
use std::os::fd::RawFd;

bitflags! {
    /// Socket readiness, both as interest and as reported events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Readiness: u8 {
        const READABLE = 0x01;
        const WRITABLE = 0x02;
        /// Peer hung up or the socket has a pending error
        const HANGUP   = 0x04;
    }
}

/// Registration change passed to [`EventHooks::change_fd`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdChange {
    Add,
    Remove,
}

/// Host scheduler integration.
///
/// Hooks are invoked from inside the connection, so implementations must not
/// call back into it synchronously; they record the change and drive
/// `service()` later from their own loop.
pub trait EventHooks {
    fn change_fd(&mut self, fd: RawFd, change: FdChange);
    fn change_events(&mut self, fd: RawFd, events: Readiness);
}

/// Token identifying one outstanding call
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct CallToken(u64);

/// Set of outstanding calls on one connection
#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    next: u64,
    active: BTreeSet<u64>,
}

impl PendingCalls {
    /// Register a call; the flag is true on the empty to non-empty transition
    pub(crate) fn insert(&mut self) -> (CallToken, bool) {
        let id = self.next;
        self.next += 1;
        let first = self.active.is_empty();
        self.active.insert(id);
        (CallToken(id), first)
    }

    /// Drop a call; the flag is true when this emptied the registry
    pub(crate) fn remove(&mut self, token: CallToken) -> bool {
        self.active.remove(&token.0) && self.active.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Forget every call; true if any were outstanding
    pub(crate) fn clear(&mut self) -> bool {
        let had = !self.active.is_empty();
        self.active.clear();
        had
    }
}
