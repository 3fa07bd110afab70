//! Session/share facade
//!
//! A [`Context`] moves through `Disconnected -> Connected -> ShareAttached`.
//! Every operation that touches the wire returns a [`Call`]; file, directory
//! and path operations require an attached share and assert otherwise.

use super::call::Call;
use super::config::ClientConfig;
use super::connection::{Connection, SessionState};
use super::pdu::Pdu;
use super::pending::{EventHooks, Readiness};
use super::scheduler::TokioScheduler;
use super::session;
use crate::auth::Authenticator;
use crate::error::{Error, Result};
use crate::protocol::smb2_constants::SecurityMode;
use crate::protocol::{Reply, Request, Response};
use crate::url::SmbUrl;
use std::cell::{Ref, RefCell};
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upgrade a back-reference held by a handle or scheduler task
pub(crate) fn parent(conn: &Weak<RefCell<Connection>>) -> Rc<RefCell<Connection>> {
    match conn.upgrade() {
        Some(conn) => conn,
        None => panic!("parent connection has gone away"),
    }
}

/// Share-relative wire path: no leading slash, backslash separators
pub(crate) fn smb_path(path: &str) -> String {
    path.trim_matches('/').replace('/', "\\")
}

/// Replace the command name of a status error with the operation that failed
pub(crate) fn annotate(err: Error, what: impl FnOnce() -> String) -> Error {
    match err {
        Error::Status { status, .. } => Error::status(status, what()),
        other => other,
    }
}

pub(crate) fn assert_attached(conn: &Connection, op: &str) {
    assert_eq!(
        conn.state,
        SessionState::ShareAttached,
        "{}() needs an attached share",
        op
    );
}

/// Queue a single command whose reply `handle` turns into the call result
pub(crate) fn issue<T, F>(conn: &Rc<RefCell<Connection>>, request: Request, handle: F) -> Call<T>
where
    T: 'static,
    F: FnOnce(&mut Connection, Result<Response>) -> Result<T> + 'static,
{
    let (completer, call) = Call::start(conn);
    let mut c = conn.borrow_mut();
    let mut pdu = c.build_pdu(request);
    pdu.on_complete(move |conn, result| {
        let result = handle(conn, result);
        completer.finish(conn, result);
    });
    c.submit(pdu);
    call
}

/// SMB2 client context: one connection, one session, at most one share
pub struct Context {
    conn: Rc<RefCell<Connection>>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            conn: Rc::new(RefCell::new(Connection::new(config))),
        }
    }

    pub(crate) fn rc(&self) -> &Rc<RefCell<Connection>> {
        &self.conn
    }

    /// Borrow the underlying connection
    pub fn connection(&self) -> Ref<'_, Connection> {
        self.conn.borrow()
    }

    pub fn set_security_mode(&self, mode: SecurityMode) {
        self.conn.borrow_mut().config.security_mode = mode;
    }

    /// Encryption is not supported; enabling it fails
    pub fn set_seal(&self, seal: bool) -> Result<()> {
        if seal {
            let err = Error::NotImplemented("sealing".into());
            self.conn.borrow_mut().set_error(&err);
            return Err(err);
        }
        self.conn.borrow_mut().config.seal = false;
        Ok(())
    }

    pub fn set_user(&self, user: &str) {
        self.conn.borrow_mut().config.user = user.to_string();
    }

    pub fn set_password(&self, password: &str) {
        self.conn.borrow_mut().config.password = password.to_string();
    }

    pub fn set_domain(&self, domain: &str) {
        self.conn.borrow_mut().config.domain = domain.to_string();
    }

    pub fn set_workstation(&self, workstation: &str) {
        self.conn.borrow_mut().config.workstation = workstation.to_string();
    }

    /// Bound for the TCP connect and for every blocking `wait()`
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.conn.borrow_mut().config.timeout = timeout;
    }

    /// Use `auth` instead of anonymous NTLMSSP for the next logon
    pub fn set_authenticator(&self, auth: Box<dyn Authenticator>) {
        self.conn.borrow_mut().authenticator = Some(auth);
    }

    pub fn client_guid(&self) -> Uuid {
        self.conn.borrow().config.client_guid
    }

    pub fn max_read_size(&self) -> u32 {
        self.conn.borrow().negotiated.max_read_size
    }

    pub fn max_write_size(&self) -> u32 {
        self.conn.borrow().negotiated.max_write_size
    }

    /// Parse a connection string, recording a failure as the last error
    pub fn parse_url(&self, url: &str) -> Result<SmbUrl> {
        SmbUrl::parse(url).inspect_err(|e| self.conn.borrow_mut().set_error(e))
    }

    /// Message of the most recent failure
    pub fn error(&self) -> String {
        self.conn.borrow().error().to_string()
    }

    pub fn state(&self) -> SessionState {
        self.conn.borrow().state()
    }

    pub fn fd(&self) -> Result<RawFd> {
        self.conn.borrow().fd()
    }

    pub fn which_events(&self) -> Readiness {
        self.conn.borrow().which_events()
    }

    pub fn service(&self, ready: Readiness) -> Result<()> {
        self.conn.borrow_mut().service(ready)
    }

    /// Drive the connection from a foreign event loop
    pub fn attach(&self, hooks: Box<dyn EventHooks>) {
        self.conn.borrow_mut().attach(hooks);
    }

    /// Drive the connection from the current tokio `LocalSet`
    pub fn attach_tokio(&self) {
        let scheduler = TokioScheduler::new(Rc::downgrade(&self.conn));
        self.conn.borrow_mut().attach(Box::new(scheduler));
    }

    /// Open the TCP transport to `server` (`host` or `host:port`)
    pub fn connect(&self, server: &str) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        if conn.is_closed() {
            conn.teardown();
        }
        assert_eq!(
            conn.state,
            SessionState::Disconnected,
            "connect() on a context that is already connected"
        );
        let result = conn.open_transport(server);
        if let Err(e) = &result {
            conn.set_error(e);
        }
        result
    }

    /// Connect, negotiate, log on and attach `share` in one call
    pub fn connect_share(&self, server: &str, share: &str, user: Option<&str>) -> Call<()> {
        if let Some(user) = user {
            self.set_user(user);
        }
        if let Err(e) = self.connect(server) {
            return Call::ready(&self.conn, Err(e));
        }
        self.attach_share(share)
    }

    /// Attach `share` on a connected context, logging on first if needed
    pub fn attach_share(&self, share: &str) -> Call<()> {
        assert_eq!(
            self.state(),
            SessionState::Connected,
            "attach_share() needs a connected context without a share"
        );
        let (completer, call) = Call::start(&self.conn);
        let mut conn = self.conn.borrow_mut();
        session::establish(
            &mut conn,
            share.to_string(),
            Box::new(move |conn, result| completer.finish(conn, result)),
        );
        call
    }

    /// Detach the current share, keeping the session
    pub fn detach_share(&self) -> Call<()> {
        assert_attached(&self.conn.borrow(), "detach_share");
        let (completer, call) = Call::start(&self.conn);
        let mut conn = self.conn.borrow_mut();
        session::tree_disconnect(
            &mut conn,
            Box::new(move |conn, result| completer.finish(conn, result)),
        );
        call
    }

    /// Tree disconnect, log off and drop the transport.
    ///
    /// The context ends up `Disconnected` even when a step fails; the first
    /// failure is reported.
    pub fn disconnect_share(&self) -> Call<()> {
        let (completer, call) = Call::start(&self.conn);
        let mut conn = self.conn.borrow_mut();

        let finish: session::Step<()> = Box::new(move |conn, result| {
            conn.teardown();
            completer.finish(conn, result);
        });
        if conn.is_closed() || conn.state == SessionState::Disconnected {
            finish(&mut *conn, Ok(()));
            return call;
        }

        let logoff: session::Step<()> = Box::new(move |conn, first| {
            if !conn.logged_on {
                return finish(conn, first);
            }
            session::logoff(
                conn,
                Box::new(move |conn, result| finish(conn, first.and(result))),
            );
        });
        if conn.state == SessionState::ShareAttached {
            session::tree_disconnect(
                &mut conn,
                Box::new(move |conn, result| {
                    if let Err(e) = &result {
                        warn!("tree disconnect failed: {}", e);
                    }
                    logoff(conn, result);
                }),
            );
        } else {
            logoff(&mut *conn, Ok(()));
        }
        call
    }

    /// ECHO round trip
    pub fn echo(&self) -> Call<()> {
        issue(&self.conn, Request::Echo, |_, result| {
            result.and_then(|response| match response.reply {
                Reply::Echo => Ok(()),
                other => Err(Error::Protocol(format!(
                    "expected Echo reply, got {:?}",
                    other.command()
                ))),
            })
        })
    }

    /// Send any request and receive its decoded reply
    pub fn call(&self, request: Request) -> Call<Response> {
        debug!("generic call {:?}", request.command());
        issue(&self.conn, request, |_, result| result)
    }

    /// Send any request; `callback` runs from inside `service()` with the reply
    pub fn call_async<F>(&self, request: Request, callback: F)
    where
        F: FnOnce(&mut Connection, Result<Response>) + 'static,
    {
        let mut conn = self.conn.borrow_mut();
        let mut pdu = conn.build_pdu(request);
        pdu.on_complete(move |conn, result| {
            if let Err(e) = &result {
                conn.set_error(e);
            }
            callback(conn, result);
        });
        conn.submit(pdu);
    }

    /// Allocate a PDU whose [`PduReply`](super::PduReply) can be awaited or
    /// waited on like a [`Call`]
    pub fn build_pdu(&self, request: Request) -> Pdu {
        Pdu::owned_by(request, &self.conn)
    }

    /// Queue `pdu` and its compound chain as one frame.
    ///
    /// Failures are also delivered to every completion of the chain.
    pub fn queue_pdu(&self, pdu: Pdu) -> Result<()> {
        self.conn.borrow_mut().queue_pdu(pdu)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
