//! Share enumeration over the `srvsvc` named pipe.
//!
//! A call runs on its own `IPC$` tree so the share attached to the context,
//! if any, is left alone:
//!
//! ```text
//! TREE_CONNECT IPC$ -> CREATE srvsvc -> WRITE bind -> READ bind_ack
//!   -> IOCTL transceive (-> READ while fragments are missing)
//!   -> CLOSE -> TREE_DISCONNECT
//! ```
//!
//! Failures after the pipe is open still close it and disconnect the tree.
//! Cleanup failures are logged and do not replace the result.

use super::call::{Call, Completer};
use super::connection::{Connection, SessionState};
use super::context::{annotate, Context};
use super::pdu::Pdu;
use super::session;
use crate::dcerpc::packet::{fragment_length, BindPacket, RequestPacket, ServerPdu};
use crate::dcerpc::srvsvc::{self, ShareEnum, ShareInfo};
use crate::dcerpc::{interfaces, MAX_FRAGMENT};
use crate::error::{Error, Result};
use crate::protocol::messages::{
    FileId, Smb2CloseRequest, Smb2CreateRequest, Smb2IoctlRequest, Smb2ReadRequest,
    Smb2TreeConnectRequest, Smb2WriteRequest,
};
use crate::protocol::smb2_constants::{CreateDisposition, DesiredAccess, ShareAccess};
use crate::protocol::{Reply, Request};
use tracing::{debug, trace, warn};

const IPC_SHARE: &str = "IPC$";
const BIND_CALL_ID: u32 = 1;
const REQUEST_CALL_ID: u32 = 2;

/// One RPC round trip on the srvsvc pipe
struct PipeCall<T> {
    what: String,
    opnum: u16,
    stub: Vec<u8>,
    decode: fn(&[u8]) -> Result<T>,
    tree_id: u32,
    file_id: FileId,
    /// Bytes read from the pipe that do not yet form a whole fragment
    received: Vec<u8>,
    /// Stub data of the response fragments seen so far
    reply: Vec<u8>,
    completer: Completer<T>,
}

impl<T: 'static> PipeCall<T> {
    fn pdu(&self, conn: &Connection, request: Request) -> Pdu {
        let mut pdu = conn.build_pdu(request);
        pdu.set_tree_id(self.tree_id);
        pdu
    }

    fn fail(&self, err: Error) -> Error {
        annotate(err, || self.what.clone())
    }
}

impl Context {
    /// List the shares the server exports (NetShareEnumAll, level 1)
    pub fn share_enum(&self) -> Call<ShareEnum> {
        let server = self.rc().borrow().server.clone();
        self.pipe_call(
            "share enum".to_string(),
            srvsvc::OPNUM_NET_SHARE_ENUM_ALL,
            srvsvc::encode_share_enum_all_request(&server),
            srvsvc::decode_share_enum_all_reply,
        )
    }

    /// Look up one share (NetShareGetInfo, level 1)
    pub fn share_get_info(&self, name: &str) -> Call<ShareInfo> {
        let server = self.rc().borrow().server.clone();
        self.pipe_call(
            format!("share info {}", name),
            srvsvc::OPNUM_NET_SHARE_GET_INFO,
            srvsvc::encode_share_get_info_request(&server, name),
            srvsvc::decode_share_get_info_reply,
        )
    }

    fn pipe_call<T: 'static>(
        &self,
        what: String,
        opnum: u16,
        stub: Result<Vec<u8>>,
        decode: fn(&[u8]) -> Result<T>,
    ) -> Call<T> {
        assert_ne!(
            self.state(),
            SessionState::Disconnected,
            "share enumeration needs a connected context"
        );
        let stub = match stub {
            Ok(stub) => stub,
            Err(e) => return Call::ready(self.rc(), Err(e)),
        };
        let (completer, call) = Call::start(self.rc());
        let rpc = PipeCall {
            what,
            opnum,
            stub,
            decode,
            tree_id: 0,
            file_id: FileId::default(),
            received: Vec::new(),
            reply: Vec::new(),
            completer,
        };

        let mut conn = self.rc().borrow_mut();
        session::ensure_session(
            &mut conn,
            Box::new(move |conn, result| match result {
                Ok(()) => connect_ipc(conn, rpc),
                Err(e) => rpc.completer.finish(conn, Err(e)),
            }),
        );
        call
    }
}

fn connect_ipc<T: 'static>(conn: &mut Connection, mut rpc: PipeCall<T>) {
    let request = Smb2TreeConnectRequest::for_share(&conn.server, IPC_SHARE);
    let mut pdu = conn.build_pdu(Request::TreeConnect(request));
    pdu.on_complete(move |conn, result| {
        let outcome = result.and_then(|response| {
            let tree_id = response.tree_id;
            expect_reply!(response, TreeConnect).map(|_| tree_id)
        });
        match outcome {
            Ok(tree_id) => {
                debug!("{}: IPC$ is tree 0x{:x}", rpc.what, tree_id);
                rpc.tree_id = tree_id;
                open_pipe(conn, rpc);
            }
            Err(e) => {
                let err = rpc.fail(e);
                rpc.completer.finish(conn, Err(err));
            }
        }
    });
    conn.submit(pdu);
}

fn open_pipe<T: 'static>(conn: &mut Connection, mut rpc: PipeCall<T>) {
    let request = Smb2CreateRequest::new(srvsvc::PIPE_NAME)
        .access(DesiredAccess::GENERIC_READ | DesiredAccess::GENERIC_WRITE)
        .share(ShareAccess::FILE_SHARE_READ | ShareAccess::FILE_SHARE_WRITE)
        .disposition(CreateDisposition::Open);
    let mut pdu = rpc.pdu(conn, Request::Create(request));
    pdu.on_complete(move |conn, result| {
        match result.and_then(|response| expect_reply!(response, Create)) {
            Ok(reply) => {
                rpc.file_id = reply.file_id;
                bind(conn, rpc);
            }
            Err(e) => {
                let err = rpc.fail(e);
                disconnect_ipc(conn, rpc, Err(err));
            }
        }
    });
    conn.submit(pdu);
}

fn bind<T: 'static>(conn: &mut Connection, rpc: PipeCall<T>) {
    let packet = match BindPacket::new(BIND_CALL_ID, interfaces::SRVSVC).serialize() {
        Ok(packet) => packet,
        Err(e) => return close_pipe(conn, rpc, Err(e)),
    };
    let mut pdu = rpc.pdu(conn, Request::Write(Smb2WriteRequest::new(rpc.file_id, 0, packet)));
    pdu.on_complete(move |conn, result| {
        match result.and_then(|response| expect_reply!(response, Write)) {
            Ok(_) => read_bind_ack(conn, rpc),
            Err(e) => {
                let err = rpc.fail(e);
                close_pipe(conn, rpc, Err(err));
            }
        }
    });
    conn.submit(pdu);
}

fn read_bind_ack<T: 'static>(conn: &mut Connection, rpc: PipeCall<T>) {
    let request = Smb2ReadRequest::new(rpc.file_id, 0, MAX_FRAGMENT as u32);
    let mut pdu = rpc.pdu(conn, Request::Read(request));
    pdu.on_complete(move |conn, result| {
        let outcome = result
            .and_then(|response| expect_reply!(response, Read))
            .and_then(|reply| ServerPdu::parse(&reply.data))
            .and_then(|packet| match packet {
                ServerPdu::BindAck(ack) if ack.is_accepted() => Ok(()),
                ServerPdu::BindAck(_) => Err(Error::Rpc("srvsvc bind was not accepted".into())),
                ServerPdu::BindNak { reason, .. } => Err(Error::Rpc(format!(
                    "srvsvc bind rejected, reason {}",
                    reason
                ))),
                ServerPdu::Fault(fault) => Err(fault.into_error()),
                ServerPdu::Response(_) => {
                    Err(Error::Rpc("response to srvsvc bind was not a bind_ack".into()))
                }
            });
        match outcome {
            Ok(()) => transceive(conn, rpc),
            Err(e) => {
                let err = rpc.fail(e);
                close_pipe(conn, rpc, Err(err));
            }
        }
    });
    conn.submit(pdu);
}

fn transceive<T: 'static>(conn: &mut Connection, mut rpc: PipeCall<T>) {
    let stub = std::mem::take(&mut rpc.stub);
    let packet = match RequestPacket::new(REQUEST_CALL_ID, 0, rpc.opnum, stub).serialize() {
        Ok(packet) => packet,
        Err(e) => return close_pipe(conn, rpc, Err(e)),
    };
    let request = Smb2IoctlRequest::pipe_transceive(rpc.file_id, packet, MAX_FRAGMENT as u32);
    let mut pdu = rpc.pdu(conn, Request::Ioctl(request));
    pdu.on_complete(move |conn, result| {
        match result.and_then(|response| expect_reply!(response, Ioctl)) {
            Ok(reply) => {
                rpc.received.extend_from_slice(&reply.output);
                consume(conn, rpc);
            }
            Err(e) => {
                let err = rpc.fail(e);
                close_pipe(conn, rpc, Err(err));
            }
        }
    });
    conn.submit(pdu);
}

/// Outcome of looking at the buffered fragments
enum Progress<T> {
    Done(Result<T>),
    NeedMore,
}

fn next_fragments<T>(rpc: &mut PipeCall<T>) -> Progress<T> {
    while let Some(len) = fragment_length(&rpc.received) {
        if rpc.received.len() < len {
            break;
        }
        let fragment: Vec<u8> = rpc.received.drain(..len).collect();
        match ServerPdu::parse(&fragment) {
            Ok(ServerPdu::Response(response)) => {
                trace!("{}: fragment of {} stub bytes", rpc.what, response.stub_data.len());
                rpc.reply.extend_from_slice(&response.stub_data);
                if response.flags.is_last_frag() {
                    return Progress::Done((rpc.decode)(&rpc.reply));
                }
            }
            Ok(ServerPdu::Fault(fault)) => return Progress::Done(Err(fault.into_error())),
            Ok(other) => {
                return Progress::Done(Err(Error::Rpc(format!(
                    "unexpected packet in srvsvc response: {:?}",
                    other
                ))))
            }
            Err(e) => return Progress::Done(Err(e)),
        }
    }
    Progress::NeedMore
}

fn consume<T: 'static>(conn: &mut Connection, mut rpc: PipeCall<T>) {
    match next_fragments(&mut rpc) {
        Progress::Done(result) => {
            let result = result.map_err(|e| rpc.fail(e));
            close_pipe(conn, rpc, result);
        }
        Progress::NeedMore => read_more(conn, rpc),
    }
}

fn read_more<T: 'static>(conn: &mut Connection, rpc: PipeCall<T>) {
    let request = Smb2ReadRequest::new(rpc.file_id, 0, MAX_FRAGMENT as u32);
    let mut pdu = rpc.pdu(conn, Request::Read(request));
    pdu.on_complete(move |conn, result| {
        let mut rpc = rpc;
        match result.and_then(|response| expect_reply!(response, Read)) {
            Ok(reply) if reply.data.is_empty() => {
                let err = Error::Protocol(format!("{}: pipe ran dry mid-response", rpc.what));
                close_pipe(conn, rpc, Err(err));
            }
            Ok(reply) => {
                rpc.received.extend_from_slice(&reply.data);
                consume(conn, rpc);
            }
            Err(e) => {
                let err = rpc.fail(e);
                close_pipe(conn, rpc, Err(err));
            }
        }
    });
    conn.submit(pdu);
}

fn close_pipe<T: 'static>(conn: &mut Connection, rpc: PipeCall<T>, outcome: Result<T>) {
    let mut pdu = rpc.pdu(conn, Request::Close(Smb2CloseRequest::new(rpc.file_id)));
    pdu.on_complete(move |conn, result| {
        if let Err(e) = result {
            warn!("{}: closing srvsvc failed: {}", rpc.what, e);
        }
        disconnect_ipc(conn, rpc, outcome);
    });
    conn.submit(pdu);
}

fn disconnect_ipc<T: 'static>(conn: &mut Connection, rpc: PipeCall<T>, outcome: Result<T>) {
    let mut pdu = rpc.pdu(conn, Request::TreeDisconnect);
    pdu.on_complete(move |conn, result| {
        match result.map(|response| response.reply) {
            Ok(Reply::TreeDisconnect) => {}
            Ok(other) => warn!("{}: unexpected {:?} reply", rpc.what, other.command()),
            Err(e) => warn!("{}: IPC$ tree disconnect failed: {}", rpc.what, e),
        }
        rpc.completer.finish(conn, outcome);
    });
    conn.submit(pdu);
}
