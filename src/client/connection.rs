//! One SMB2 connection: socket, credit window, outbound queue and the
//! in-flight table that correlates replies with their completions.
//!
//! The connection never blocks and never waits. A host scheduler (or
//! [`Call::wait`](super::Call::wait)) asks for [`Connection::which_events`],
//! waits on [`Connection::fd`] and then calls [`Connection::service`] with the
//! readiness it observed. Every completion fires synchronously from inside
//! `service()` with the connection mutably borrowed, so completions can queue
//! follow-up commands directly.

use super::config::ClientConfig;
use super::file::FileState;
use super::pdu::{Completion, Member, Pdu};
use super::pending::{CallToken, EventHooks, FdChange, PendingCalls, Readiness};
use crate::auth::Authenticator;
use crate::error::{Error, Result};
use crate::protocol::codec::decode_reply;
use crate::protocol::messages::{FileId, Smb2Header};
use crate::protocol::smb2_constants::{
    header_flags, limits, Smb2Command, Smb2Dialect, SMB2_HEADER_SIZE,
};
use crate::protocol::{NtStatus, Request, Response};
use crate::transport::{encode_frame, TcpTransport, SMB_PORT};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Offset of NextCommand inside the SMB2 header
const NEXT_COMMAND_OFFSET: usize = 20;

/// Session/share lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    ShareAttached,
}

/// Parameters fixed by NEGOTIATE
#[derive(Debug, Clone)]
pub(crate) struct Negotiated {
    pub(crate) dialect: Option<Smb2Dialect>,
    pub(crate) server_guid: Uuid,
    pub(crate) max_transact_size: u32,
    pub(crate) max_read_size: u32,
    pub(crate) max_write_size: u32,
}

impl Default for Negotiated {
    fn default() -> Self {
        Self {
            dialect: None,
            server_guid: Uuid::nil(),
            max_transact_size: limits::DEFAULT_MAX_TRANSACT_SIZE,
            max_read_size: limits::DEFAULT_MAX_READ_SIZE,
            max_write_size: limits::DEFAULT_MAX_WRITE_SIZE,
        }
    }
}

/// A serialized frame waiting for the socket
struct OutboundFrame {
    data: Bytes,
    written: usize,
    /// Credits consumed by every command in the frame
    charge: u32,
    started: bool,
}

/// A sent command waiting for its reply
struct InFlight {
    command: Smb2Command,
    charge: u32,
    completion: Option<Completion>,
}

/// SMB2 connection state
pub struct Connection {
    pub(crate) config: ClientConfig,
    transport: Option<TcpTransport>,
    hooks: Option<Box<dyn EventHooks>>,
    calls: PendingCalls,
    registered_fd: Option<RawFd>,
    interest: Readiness,
    closed: bool,

    pub(crate) server: String,
    pub(crate) state: SessionState,
    pub(crate) logged_on: bool,
    pub(crate) negotiated: Negotiated,
    pub(crate) session_id: u64,
    pub(crate) tree_id: u32,
    pub(crate) share: Option<String>,
    pub(crate) authenticator: Option<Box<dyn Authenticator>>,

    credits: u32,
    credits_outstanding: u32,
    next_message_id: u64,
    outbound: VecDeque<OutboundFrame>,
    in_flight: HashMap<u64, InFlight>,

    pub(crate) files: HashMap<FileId, FileState>,
    last_error: String,
}

impl Connection {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            hooks: None,
            calls: PendingCalls::default(),
            registered_fd: None,
            interest: Readiness::empty(),
            closed: false,
            server: String::new(),
            state: SessionState::Disconnected,
            logged_on: false,
            negotiated: Negotiated::default(),
            session_id: 0,
            tree_id: 0,
            share: None,
            authenticator: None,
            credits: 1,
            credits_outstanding: 0,
            next_message_id: 0,
            outbound: VecDeque::new(),
            in_flight: HashMap::new(),
            files: HashMap::new(),
            last_error: String::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Text of the most recent failed call
    pub fn error(&self) -> &str {
        &self.last_error
    }

    pub(crate) fn set_error(&mut self, err: &Error) {
        self.last_error = err.to_string();
    }

    /// Number of commands sent or queued and not yet answered
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_calls(&self) -> usize {
        self.calls.len()
    }

    /// Open the TCP transport to `server` (`host` or `host:port`)
    pub(crate) fn open_transport(&mut self, server: &str) -> Result<()> {
        assert!(
            self.transport.is_none(),
            "connection already has a transport"
        );
        let (host, port) = split_host_port(server, self.config.port)?;
        let transport = TcpTransport::connect(host, port, self.config.timeout)?;
        info!("connected to {}", transport.remote_addr());

        self.transport = Some(transport);
        self.server = host.to_string();
        self.closed = false;
        self.state = SessionState::Connected;
        self.credits = 1;
        self.credits_outstanding = 0;
        self.next_message_id = 0;
        Ok(())
    }

    pub(crate) fn transport(&self) -> Option<&TcpTransport> {
        self.transport.as_ref()
    }

    /// Socket descriptor to wait on
    pub fn fd(&self) -> Result<RawFd> {
        self.transport
            .as_ref()
            .map(|t| t.as_raw_fd())
            .ok_or(Error::NotConnected)
    }

    /// Readiness the connection currently needs
    pub fn which_events(&self) -> Readiness {
        if self.closed || self.transport.is_none() {
            return Readiness::empty();
        }
        let mut events = Readiness::READABLE;
        if let Some(front) = self.outbound.front() {
            if self.can_send(front) {
                events |= Readiness::WRITABLE;
            }
        }
        events
    }

    fn can_send(&self, frame: &OutboundFrame) -> bool {
        // With nothing outstanding no grant can arrive, so send regardless.
        frame.started || self.credits >= frame.charge || self.credits_outstanding == 0
    }

    /// Install host scheduler hooks, switching to event-loop mode
    pub fn attach(&mut self, hooks: Box<dyn EventHooks>) {
        assert!(
            self.hooks.is_none(),
            "connection is already attached to an event loop"
        );
        assert!(
            self.calls.is_empty(),
            "cannot attach an event loop while calls are outstanding"
        );
        self.hooks = Some(hooks);
    }

    /// True once hooks are installed
    pub fn has_event_loop(&self) -> bool {
        self.hooks.is_some()
    }

    pub(crate) fn register_call(&mut self) -> CallToken {
        let (token, first) = self.calls.insert();
        if first {
            self.subscribe();
        }
        token
    }

    pub(crate) fn complete_call(&mut self, token: CallToken) {
        if self.calls.remove(token) {
            self.unsubscribe();
        }
    }

    fn subscribe(&mut self) {
        let Some(fd) = self.transport.as_ref().map(|t| t.as_raw_fd()) else {
            return;
        };
        if let Some(hooks) = self.hooks.as_mut() {
            trace!("subscribing fd {}", fd);
            let events = Readiness::READABLE | Readiness::WRITABLE;
            hooks.change_fd(fd, FdChange::Add);
            hooks.change_events(fd, events);
            self.registered_fd = Some(fd);
            self.interest = events;
        }
    }

    fn unsubscribe(&mut self) {
        if let (Some(fd), Some(hooks)) = (self.registered_fd.take(), self.hooks.as_mut()) {
            trace!("unsubscribing fd {}", fd);
            hooks.change_fd(fd, FdChange::Remove);
            self.interest = Readiness::empty();
        }
    }

    fn update_interest(&mut self) {
        let Some(fd) = self.registered_fd else {
            return;
        };
        let events = self.which_events();
        if events != self.interest {
            self.interest = events;
            if let Some(hooks) = self.hooks.as_mut() {
                hooks.change_events(fd, events);
            }
        }
    }

    /// Allocate a PDU for `request`
    pub fn build_pdu(&self, request: Request) -> Pdu {
        Pdu::new(request)
    }

    /// (charge written in the header, credits consumed)
    fn credit_charge(&self, request: &Request) -> (u16, u32) {
        match self.negotiated.dialect {
            Some(d) if d != Smb2Dialect::Smb202 => {
                let charge = request.credit_charge();
                (charge, charge as u32)
            }
            _ => (0, 1),
        }
    }

    /// Serialize `pdu` and its compound chain into one frame and queue it.
    ///
    /// Every member carrying a completion is registered as a pending call
    /// until that completion fires. On failure every completion of the chain
    /// has already fired with the error; the returned error is for callers
    /// that want to log it.
    pub fn queue_pdu(&mut self, pdu: Pdu) -> Result<()> {
        let mut members = pdu.into_members();
        for completion in members.iter_mut().filter_map(|m| m.completion.as_mut()) {
            completion.register(self);
        }
        if self.closed || self.transport.is_none() {
            fail_members(self, members, || Error::NotConnected);
            return Err(Error::NotConnected);
        }

        let (data, slots) = match self.encode_chain(&members) {
            Ok(encoded) => encoded,
            Err(e) => {
                let text = e.to_string();
                fail_members(self, members, || {
                    Error::InvalidParameter(format!("request encoding failed: {}", text))
                });
                return Err(e);
            }
        };

        let mut total_charge = 0;
        for (member, (message_id, charge)) in members.into_iter().zip(slots) {
            let command = member.request.command();
            trace!("queue {:?} message_id={} charge={}", command, message_id, charge);
            total_charge += charge;
            self.next_message_id = message_id + charge as u64;
            self.in_flight.insert(
                message_id,
                InFlight {
                    command,
                    charge,
                    completion: member.completion,
                },
            );
        }
        self.outbound.push_back(OutboundFrame {
            data,
            written: 0,
            charge: total_charge,
            started: false,
        });
        self.update_interest();
        Ok(())
    }

    /// Lay out the chain as one frame; returns it with the (message id,
    /// credits consumed) of each member. Message ids are only reserved by the
    /// caller once the whole frame is built.
    fn encode_chain(&self, members: &[Member]) -> Result<(Bytes, Vec<(u64, u32)>)> {
        let count = members.len();
        let mut payload = Vec::new();
        let mut slots = Vec::with_capacity(count);
        let mut message_id = self.next_message_id;

        for (i, member) in members.iter().enumerate() {
            let body = member.request.encode_body()?;
            let (charge_field, charge) = self.credit_charge(&member.request);

            let mut header = Smb2Header::new(member.request.command());
            header.credit_charge = charge_field;
            header.credits = self.config.credit_request;
            header.message_id = message_id;
            header.tree_id = member.tree_id.unwrap_or(self.tree_id);
            header.session_id = self.session_id;
            if i > 0 {
                header.flags |= header_flags::RELATED_OPERATIONS;
            }

            let start = payload.len();
            header.write_to(&mut payload)?;
            payload.extend_from_slice(&body);
            if i + 1 < count {
                while (payload.len() - start) % 8 != 0 {
                    payload.push(0);
                }
                let next = (payload.len() - start) as u32;
                payload[start + NEXT_COMMAND_OFFSET..start + NEXT_COMMAND_OFFSET + 4]
                    .copy_from_slice(&next.to_le_bytes());
            }

            slots.push((message_id, charge));
            message_id += charge as u64;
        }

        Ok((encode_frame(&payload)?, slots))
    }

    /// Queue `pdu`, leaving any failure to its completions
    pub(crate) fn submit(&mut self, pdu: Pdu) {
        if let Err(e) = self.queue_pdu(pdu) {
            debug!("queue failed: {}", e);
        }
    }

    /// Run protocol I/O for the readiness the host observed.
    ///
    /// A transport failure fails every outstanding command with
    /// `ConnectionClosed`, closes the connection and is returned.
    pub fn service(&mut self, ready: Readiness) -> Result<()> {
        assert!(!self.closed, "service() called on a closed connection");

        let result = self.service_io(ready);
        if let Err(e) = &result {
            warn!("connection to {} failed: {}", self.server, e);
            self.set_error(e);
            self.fail_all();
        }
        self.update_interest();
        result
    }

    fn service_io(&mut self, ready: Readiness) -> Result<()> {
        if ready.intersects(Readiness::READABLE | Readiness::HANGUP) {
            self.transport
                .as_mut()
                .ok_or(Error::NotConnected)?
                .fill()?;
            loop {
                let frame = match self.transport.as_mut() {
                    Some(transport) => transport.next_frame()?,
                    None => None,
                };
                match frame {
                    Some(frame) => self.dispatch_frame(&frame)?,
                    None => break,
                }
            }
        }
        if ready.contains(Readiness::WRITABLE) && !self.closed {
            self.flush_outbound()?;
        }
        Ok(())
    }

    fn flush_outbound(&mut self) -> Result<()> {
        loop {
            let Some(front) = self.outbound.front() else {
                break;
            };
            if !front.started {
                if !self.can_send(front) {
                    trace!(
                        "credit window exhausted: have {}, need {}",
                        self.credits,
                        front.charge
                    );
                    break;
                }
                let charge = front.charge;
                self.credits = self.credits.saturating_sub(charge);
                self.credits_outstanding += charge;
                if let Some(front) = self.outbound.front_mut() {
                    front.started = true;
                }
            }

            let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
            let Some(front) = self.outbound.front_mut() else {
                break;
            };
            let n = transport.write_some(&front.data[front.written..])?;
            if n == 0 {
                break;
            }
            front.written += n;
            if front.written == front.data.len() {
                trace!("sent frame of {} bytes", front.data.len());
                self.outbound.pop_front();
            }
        }
        Ok(())
    }

    /// Split a frame into its (possibly compounded) replies
    fn dispatch_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut offset = 0;
        loop {
            let chunk = &frame[offset..];
            let header = Smb2Header::parse(chunk)?;
            let next = header.next_command as usize;
            let len = if next == 0 { chunk.len() } else { next };
            if len < SMB2_HEADER_SIZE || len > chunk.len() {
                return Err(Error::Protocol(format!(
                    "reply NextCommand {} outside frame of {} bytes",
                    next,
                    chunk.len()
                )));
            }
            self.handle_reply(header, &chunk[SMB2_HEADER_SIZE..len]);
            if next == 0 {
                return Ok(());
            }
            offset += next;
        }
    }

    fn handle_reply(&mut self, header: Smb2Header, body: &[u8]) {
        if !header.is_response() {
            warn!("ignoring request {:?} from server", header.command);
            return;
        }
        self.credits = self.credits.saturating_add(header.credits as u32);

        let status = NtStatus(header.status);
        if status == NtStatus::PENDING {
            trace!("interim reply for message_id={}", header.message_id);
            return;
        }

        let Some(entry) = self.in_flight.remove(&header.message_id) else {
            warn!(
                "reply {:?} for unknown message_id={}",
                header.command, header.message_id
            );
            return;
        };
        self.credits_outstanding = self.credits_outstanding.saturating_sub(entry.charge);

        let result = if header.command != entry.command {
            Err(Error::Protocol(format!(
                "{:?} reply to a {:?} request",
                header.command, entry.command
            )))
        } else {
            decode_reply(header.command, status, body).map(|reply| Response {
                status,
                message_id: header.message_id,
                session_id: header.session_id,
                tree_id: header.tree_id,
                reply,
            })
        };
        debug!(
            "{:?} message_id={} completed: {}",
            header.command, header.message_id, status
        );

        if let Some(completion) = entry.completion {
            completion.fire(self, result);
        }
    }

    /// Fail every queued and in-flight command with `ConnectionClosed`
    fn fail_all(&mut self) {
        self.closed = true;
        self.outbound.clear();
        let mut pending: Vec<(u64, InFlight)> = self.in_flight.drain().collect();
        pending.sort_by_key(|(id, _)| *id);
        for (_, entry) in pending {
            if let Some(completion) = entry.completion {
                completion.fire(self, Err(Error::ConnectionClosed));
            }
        }
    }

    /// Release the transport after failing everything still outstanding
    pub(crate) fn teardown(&mut self) {
        self.fail_all();
        if self.calls.clear() {
            self.unsubscribe();
        }
        if let Some(transport) = self.transport.take() {
            info!("disconnecting from {}", transport.remote_addr());
            transport.shutdown();
        }
        self.state = SessionState::Disconnected;
        self.negotiated = Negotiated::default();
        self.logged_on = false;
        self.session_id = 0;
        self.tree_id = 0;
        self.share = None;
        self.files.clear();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn fail_members(conn: &mut Connection, members: Vec<Member>, err: impl Fn() -> Error) {
    for member in members {
        if let Some(completion) = member.completion {
            completion.fire(conn, Err(err()));
        }
    }
}

fn split_host_port(server: &str, default_port: u16) -> Result<(&str, u16)> {
    if server.is_empty() {
        return Err(Error::InvalidParameter("empty server name".into()));
    }
    match server.rsplit_once(':') {
        // A bare IPv6 literal has several colons and no port.
        Some((host, port)) if !host.contains(':') => {
            let port = port
                .parse()
                .map_err(|_| Error::InvalidParameter(format!("bad port in {:?}", server)))?;
            Ok((host, port))
        }
        _ => Ok((server, if default_port == 0 { SMB_PORT } else { default_port })),
    }
}
