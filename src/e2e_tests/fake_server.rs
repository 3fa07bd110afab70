//! Filesystem-backed SMB2 server for end-to-end tests
//!
//! Serves one connection at a time from a std thread. Disk trees map onto a
//! temporary directory; `IPC$` carries an in-memory `srvsvc` pipe that speaks
//! just enough DCE/RPC for share enumeration. Message bodies go through the
//! crate's own codecs.

use crate::auth::ntlmssp::ChallengeMessage;
use crate::dcerpc::packet::{BindAckPacket, BindPacket, FaultPacket, RequestPacket, ResponsePacket};
use crate::dcerpc::srvsvc::{self, share_type, ShareInfo};
use crate::dcerpc::{fault, PacketFlags};
use crate::error::Result;
use crate::protocol::messages::{
    DirectoryEntry, FileAllInformation, FileId, FileTimes, FsFullSizeInformation,
    RenameInformation, Smb2CloseResponse, Smb2CreateRequest, Smb2CreateResponse,
    Smb2ErrorResponse, Smb2Header, Smb2IoctlResponse, Smb2NegotiateResponse,
    Smb2QueryDirectoryResponse, Smb2QueryInfoResponse, Smb2ReadResponse,
    Smb2SessionSetupResponse, Smb2TreeConnectResponse, Smb2WriteResponse, SmbMessage,
};
use crate::protocol::smb2_constants::{
    create_action, fsctl, header_flags, info_class, info_type, CloseFlags, CreateDisposition,
    CreateOptions, FileAttributes, SecurityMode, SessionFlags, Smb2Capabilities, Smb2Command,
    Smb2Dialect, SMB2_HEADER_SIZE,
};
use crate::protocol::{NtStatus, Reply, Request};
use crate::transport::encode_frame;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

pub const DISK_SHARE: &str = "share";
const SESSION_ID: u64 = 0x0000_0400_0000_0011;
const NEXT_COMMAND_OFFSET: usize = 20;
const NERR_NET_NAME_NOT_FOUND: u32 = 2310;

/// Knobs for provoking client behaviour
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub dialect: Smb2Dialect,
    pub security_mode: SecurityMode,
    pub max_read_size: u32,
    pub max_write_size: u32,
    /// Credits granted in every reply
    pub credits: u16,
    /// Drop the connection instead of answering this command
    pub hang_up_on: Option<Smb2Command>,
    /// Stub bytes per srvsvc response fragment
    pub rpc_fragment: usize,
    /// Most bytes a single pipe READ or IOCTL hands back
    pub pipe_chunk: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            dialect: Smb2Dialect::Smb302,
            security_mode: SecurityMode::SIGNING_ENABLED,
            max_read_size: 65536,
            max_write_size: 65536,
            credits: 64,
            hang_up_on: None,
            rpc_fragment: 4096,
            pipe_chunk: usize::MAX,
        }
    }
}

/// A running test server; the listener lives until the test process exits
pub struct FakeServer {
    addr: SocketAddr,
    root: TempDir,
    log: Arc<Mutex<Vec<Smb2Command>>>,
}

impl FakeServer {
    pub fn start() -> Self {
        Self::with_options(ServerOptions::default())
    }

    pub fn with_options(options: ServerOptions) -> Self {
        let root = tempfile::tempdir().expect("create server root");
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let log: Arc<Mutex<Vec<Smb2Command>>> = Arc::default();

        let path = root.path().to_path_buf();
        let thread_log = log.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let mut conn =
                    ServerConnection::new(stream, path.clone(), options.clone(), thread_log.clone());
                if let Err(e) = conn.run() {
                    debug!("fake server connection ended: {}", e);
                }
            }
        });

        Self { addr, root, log }
    }

    /// `host:port` to hand to `Context::connect`
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Every command received so far, in arrival order
    pub fn commands(&self) -> Vec<Smb2Command> {
        self.log.lock().expect("command log").clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tree {
    Disk,
    Ipc,
}

enum OpenKind {
    File,
    Dir { listed: bool },
    /// `chunked` once a request went through: only replies to it are split
    Pipe { out: Vec<u8>, chunked: bool },
}

struct Open {
    path: PathBuf,
    kind: OpenKind,
    delete_on_close: bool,
}

type Outcome = std::result::Result<(NtStatus, Reply), NtStatus>;

fn ok(reply: Reply) -> Outcome {
    Ok((NtStatus::SUCCESS, reply))
}

fn io_status(err: std::io::Error) -> NtStatus {
    match err.kind() {
        ErrorKind::NotFound => NtStatus::OBJECT_NAME_NOT_FOUND,
        ErrorKind::AlreadyExists => NtStatus::OBJECT_NAME_COLLISION,
        ErrorKind::PermissionDenied => NtStatus::ACCESS_DENIED,
        _ => match err.raw_os_error() {
            Some(code) if code == nix::errno::Errno::ENOTEMPTY as i32 => {
                NtStatus::DIRECTORY_NOT_EMPTY
            }
            _ => NtStatus::INVALID_PARAMETER,
        },
    }
}

fn filetime(time: std::io::Result<SystemTime>) -> u64 {
    let since = time
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .unwrap_or_default();
    (since.as_secs() + 11_644_473_600) * 10_000_000 + since.subsec_nanos() as u64 / 100
}

fn attributes(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        FileAttributes::DIRECTORY.bits()
    } else {
        FileAttributes::ARCHIVE.bits()
    }
}

fn file_times(meta: &fs::Metadata) -> FileTimes {
    FileTimes {
        creation_time: filetime(meta.created().or_else(|_| meta.modified())),
        last_access_time: filetime(meta.accessed()),
        last_write_time: filetime(meta.modified()),
        change_time: filetime(meta.modified()),
        allocation_size: meta.blocks() * 512,
        end_of_file: if meta.is_dir() { 0 } else { meta.len() },
        file_attributes: attributes(meta),
    }
}

fn test_shares() -> Vec<ShareInfo> {
    vec![
        ShareInfo::new(DISK_SHARE, share_type::DISKTREE, "Test share"),
        ShareInfo::new("IPC$", share_type::IPC | share_type::HIDDEN, "Remote IPC"),
    ]
}

struct ServerConnection {
    stream: TcpStream,
    root: PathBuf,
    options: ServerOptions,
    log: Arc<Mutex<Vec<Smb2Command>>>,
    session_id: u64,
    trees: HashMap<u32, Tree>,
    next_tree: u32,
    opens: HashMap<FileId, Open>,
    next_file: u64,
}

impl ServerConnection {
    fn new(
        stream: TcpStream,
        root: PathBuf,
        options: ServerOptions,
        log: Arc<Mutex<Vec<Smb2Command>>>,
    ) -> Self {
        Self {
            stream,
            root,
            options,
            log,
            session_id: 0,
            trees: HashMap::new(),
            next_tree: 1,
            opens: HashMap::new(),
            next_file: 1,
        }
    }

    fn run(&mut self) -> Result<()> {
        while let Some(frame) = self.read_frame()? {
            match self.handle_frame(&frame)? {
                Some(payload) => self.stream.write_all(&encode_frame(&payload)?)?,
                None => {
                    debug!("fake server hanging up");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut prefix = [0u8; 4];
        if let Err(e) = self.stream.read_exact(&mut prefix) {
            return match e.kind() {
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset => Ok(None),
                _ => Err(e.into()),
            };
        }
        let len = (u32::from_be_bytes(prefix) & 0x00FF_FFFF) as usize;
        let mut frame = vec![0u8; len];
        self.stream.read_exact(&mut frame)?;
        Ok(Some(frame))
    }

    /// Answer every command of a (possibly compounded) frame; `None` hangs up
    fn handle_frame(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        let mut offset = 0;
        let mut last_file = None;
        let mut chain_status = None;

        loop {
            let chunk = &frame[offset..];
            let header = Smb2Header::parse(chunk)?;
            let next = header.next_command as usize;
            let end = if next == 0 { chunk.len() } else { next };
            let body = &chunk[SMB2_HEADER_SIZE..end];
            self.log.lock().expect("command log").push(header.command);
            if self.options.hang_up_on == Some(header.command) {
                return Ok(None);
            }

            let related = header.is_related();
            let mut tree_id = header.tree_id;
            let outcome = match chain_status {
                Some(status) if related => Err(status),
                _ => self.dispatch(&header, body, &mut last_file, &mut tree_id),
            };
            let (status, reply_body) = match outcome {
                Ok((status, reply)) => (status, reply.encode_body()?),
                Err(status) => {
                    chain_status = Some(status);
                    (status, Smb2ErrorResponse::default().serialize()?)
                }
            };

            let mut reply = Smb2Header::new(header.command);
            reply.status = status.code();
            reply.flags = header_flags::RESPONSE | (header.flags & header_flags::RELATED_OPERATIONS);
            reply.credit_charge = header.credit_charge;
            reply.credits = self.options.credits;
            reply.message_id = header.message_id;
            reply.tree_id = tree_id;
            reply.session_id = self.session_id;

            let start = out.len();
            reply.write_to(&mut out)?;
            out.extend_from_slice(&reply_body);
            if next == 0 {
                return Ok(Some(out));
            }
            while (out.len() - start) % 8 != 0 {
                out.push(0);
            }
            let len = (out.len() - start) as u32;
            out[start + NEXT_COMMAND_OFFSET..start + NEXT_COMMAND_OFFSET + 4]
                .copy_from_slice(&len.to_le_bytes());
            offset += next;
        }
    }

    fn dispatch(
        &mut self,
        header: &Smb2Header,
        body: &[u8],
        last_file: &mut Option<FileId>,
        tree_id: &mut u32,
    ) -> Outcome {
        let request =
            Request::decode(header.command, body).map_err(|_| NtStatus::INVALID_PARAMETER)?;
        let resolve = |file_id: FileId| {
            if file_id == FileId::COMPOUND {
                last_file.ok_or(NtStatus::INVALID_PARAMETER)
            } else {
                Ok(file_id)
            }
        };

        match request {
            Request::Negotiate(req) => {
                let dialect = if req.dialects.contains(&self.options.dialect) {
                    self.options.dialect
                } else {
                    *req.dialects.iter().max().ok_or(NtStatus::NOT_SUPPORTED)?
                };
                ok(Reply::Negotiate(Smb2NegotiateResponse {
                    security_mode: self.options.security_mode,
                    dialect_revision: dialect,
                    server_guid: Uuid::from_u128(0x5eed),
                    capabilities: Smb2Capabilities::LARGE_MTU,
                    max_transact_size: 65536,
                    max_read_size: self.options.max_read_size,
                    max_write_size: self.options.max_write_size,
                    system_time: 0,
                    server_start_time: 0,
                    security_blob: Vec::new(),
                }))
            }
            Request::SessionSetup(req) => {
                self.session_id = SESSION_ID;
                match req.security_blob.get(8) {
                    Some(1) => {
                        let challenge = ChallengeMessage::new("FAKE", [0x11; 8])
                            .serialize()
                            .map_err(|_| NtStatus::INVALID_PARAMETER)?;
                        Ok((
                            NtStatus::MORE_PROCESSING_REQUIRED,
                            Reply::SessionSetup(Smb2SessionSetupResponse {
                                session_flags: SessionFlags::empty(),
                                security_blob: challenge,
                            }),
                        ))
                    }
                    Some(3) => ok(Reply::SessionSetup(Smb2SessionSetupResponse {
                        session_flags: SessionFlags::IS_GUEST,
                        security_blob: Vec::new(),
                    })),
                    _ => Err(NtStatus::LOGON_FAILURE),
                }
            }
            Request::Logoff => {
                self.trees.clear();
                ok(Reply::Logoff)
            }
            Request::TreeConnect(req) => {
                let name = req.path.rsplit('\\').next().unwrap_or_default();
                let tree = if name.eq_ignore_ascii_case("IPC$") {
                    Tree::Ipc
                } else if name.eq_ignore_ascii_case(DISK_SHARE) {
                    Tree::Disk
                } else {
                    return Err(NtStatus::BAD_NETWORK_NAME);
                };
                *tree_id = self.next_tree;
                self.next_tree += 1;
                self.trees.insert(*tree_id, tree);
                ok(Reply::TreeConnect(Smb2TreeConnectResponse {
                    share_type: if tree == Tree::Ipc { 0x02 } else { 0x01 },
                    share_flags: 0,
                    capabilities: 0,
                    maximal_access: 0x001f_01ff,
                }))
            }
            Request::TreeDisconnect => match self.trees.remove(&header.tree_id) {
                Some(_) => ok(Reply::TreeDisconnect),
                None => Err(NtStatus::NETWORK_NAME_DELETED),
            },
            Request::Create(req) => {
                let tree = *self
                    .trees
                    .get(&header.tree_id)
                    .ok_or(NtStatus::NETWORK_NAME_DELETED)?;
                let (file_id, response) = self.create(tree, &req)?;
                *last_file = Some(file_id);
                ok(Reply::Create(response))
            }
            Request::Close(req) => {
                let file_id = resolve(req.file_id)?;
                let open = self.opens.remove(&file_id).ok_or(NtStatus::FILE_CLOSED)?;
                if open.delete_on_close {
                    match open.kind {
                        OpenKind::Dir { .. } => fs::remove_dir(&open.path),
                        _ => fs::remove_file(&open.path),
                    }
                    .map_err(io_status)?;
                }
                ok(Reply::Close(Smb2CloseResponse {
                    flags: CloseFlags::empty(),
                    times: FileTimes::default(),
                }))
            }
            Request::Flush(req) => {
                self.opens.get(&resolve(req.file_id)?).ok_or(NtStatus::FILE_CLOSED)?;
                ok(Reply::Flush)
            }
            Request::Read(req) => {
                let open = self
                    .opens
                    .get_mut(&resolve(req.file_id)?)
                    .ok_or(NtStatus::FILE_CLOSED)?;
                match &mut open.kind {
                    OpenKind::File => {
                        let mut file = fs::File::open(&open.path).map_err(io_status)?;
                        let size = file.metadata().map_err(io_status)?.len();
                        if req.offset >= size {
                            return Err(NtStatus::END_OF_FILE);
                        }
                        let len = (size - req.offset).min(req.length as u64) as usize;
                        let mut data = vec![0u8; len];
                        file.seek(SeekFrom::Start(req.offset)).map_err(io_status)?;
                        file.read_exact(&mut data).map_err(io_status)?;
                        ok(Reply::Read(Smb2ReadResponse {
                            data_remaining: 0,
                            data,
                        }))
                    }
                    OpenKind::Pipe { out, chunked } => {
                        let mut limit = req.length as usize;
                        if *chunked {
                            limit = limit.min(self.options.pipe_chunk);
                        }
                        let (status, data) = drain_pipe(out, limit);
                        Ok((
                            status,
                            Reply::Read(Smb2ReadResponse {
                                data_remaining: 0,
                                data,
                            }),
                        ))
                    }
                    OpenKind::Dir { .. } => Err(NtStatus::INVALID_DEVICE_REQUEST),
                }
            }
            Request::Write(req) => {
                let open = self
                    .opens
                    .get_mut(&resolve(req.file_id)?)
                    .ok_or(NtStatus::FILE_CLOSED)?;
                match &mut open.kind {
                    OpenKind::File => {
                        let mut file = fs::OpenOptions::new()
                            .write(true)
                            .open(&open.path)
                            .map_err(io_status)?;
                        file.seek(SeekFrom::Start(req.offset)).map_err(io_status)?;
                        file.write_all(&req.data).map_err(io_status)?;
                    }
                    OpenKind::Pipe { out, .. } => {
                        let bind =
                            BindPacket::parse(&req.data).map_err(|_| NtStatus::INVALID_PARAMETER)?;
                        let ack = BindAckPacket::accept(bind.call_id, "\\PIPE\\srvsvc")
                            .serialize()
                            .map_err(|_| NtStatus::INVALID_PARAMETER)?;
                        out.extend_from_slice(&ack);
                    }
                    OpenKind::Dir { .. } => return Err(NtStatus::INVALID_DEVICE_REQUEST),
                }
                ok(Reply::Write(Smb2WriteResponse {
                    count: req.data.len() as u32,
                    remaining: 0,
                }))
            }
            Request::Ioctl(req) => {
                if req.ctl_code != fsctl::PIPE_TRANSCEIVE {
                    return Err(NtStatus::NOT_SUPPORTED);
                }
                let pipe_chunk = self.options.pipe_chunk;
                let rpc_fragment = self.options.rpc_fragment;
                let open = self
                    .opens
                    .get_mut(&resolve(req.file_id)?)
                    .ok_or(NtStatus::FILE_CLOSED)?;
                let OpenKind::Pipe { out, chunked } = &mut open.kind else {
                    return Err(NtStatus::INVALID_DEVICE_REQUEST);
                };
                let request =
                    RequestPacket::parse(&req.input).map_err(|_| NtStatus::INVALID_PARAMETER)?;
                let reply =
                    rpc_reply(&request, rpc_fragment).map_err(|_| NtStatus::INVALID_PARAMETER)?;
                out.extend_from_slice(&reply);
                *chunked = true;
                let limit = (req.max_output_response as usize).min(pipe_chunk);
                let (status, output) = drain_pipe(out, limit);
                Ok((
                    status,
                    Reply::Ioctl(Smb2IoctlResponse {
                        ctl_code: req.ctl_code,
                        file_id: req.file_id,
                        flags: 0,
                        output,
                    }),
                ))
            }
            Request::Echo => ok(Reply::Echo),
            Request::QueryDirectory(req) => {
                let open = self
                    .opens
                    .get_mut(&resolve(req.file_id)?)
                    .ok_or(NtStatus::FILE_CLOSED)?;
                let OpenKind::Dir { listed } = &mut open.kind else {
                    return Err(NtStatus::INVALID_PARAMETER);
                };
                if *listed {
                    return Err(NtStatus::NO_MORE_FILES);
                }
                *listed = true;
                let mut entries = Vec::new();
                for item in fs::read_dir(&open.path).map_err(io_status)? {
                    let item = item.map_err(io_status)?;
                    let meta = item.metadata().map_err(io_status)?;
                    let times = file_times(&meta);
                    entries.push(DirectoryEntry {
                        file_index: 0,
                        creation_time: times.creation_time,
                        last_access_time: times.last_access_time,
                        last_write_time: times.last_write_time,
                        change_time: times.change_time,
                        end_of_file: times.end_of_file,
                        allocation_size: times.allocation_size,
                        file_attributes: times.file_attributes,
                        ea_size: 0,
                        file_id: meta.ino(),
                        name: item.file_name().to_string_lossy().into_owned(),
                    });
                }
                if entries.is_empty() {
                    return Err(NtStatus::NO_MORE_FILES);
                }
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                let output_buffer =
                    DirectoryEntry::encode_list(&entries).map_err(|_| NtStatus::INVALID_PARAMETER)?;
                ok(Reply::QueryDirectory(Smb2QueryDirectoryResponse { output_buffer }))
            }
            Request::QueryInfo(req) => {
                let open = self
                    .opens
                    .get(&resolve(req.file_id)?)
                    .ok_or(NtStatus::FILE_CLOSED)?;
                let output_buffer = match (req.info_type, req.file_info_class) {
                    (info_type::FILE, info_class::FILE_ALL_INFORMATION) => {
                        let meta = fs::metadata(&open.path).map_err(io_status)?;
                        let times = file_times(&meta);
                        FileAllInformation {
                            creation_time: times.creation_time,
                            last_access_time: times.last_access_time,
                            last_write_time: times.last_write_time,
                            change_time: times.change_time,
                            file_attributes: times.file_attributes,
                            allocation_size: times.allocation_size,
                            end_of_file: times.end_of_file,
                            number_of_links: meta.nlink() as u32,
                            delete_pending: open.delete_on_close,
                            directory: meta.is_dir(),
                            index_number: meta.ino(),
                            name: open
                                .path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_default(),
                            ..FileAllInformation::default()
                        }
                        .encode()
                    }
                    (info_type::FILESYSTEM, info_class::FILE_FS_FULL_SIZE_INFORMATION) => {
                        FsFullSizeInformation {
                            total_allocation_units: 1000,
                            caller_available_allocation_units: 400,
                            actual_available_allocation_units: 500,
                            sectors_per_allocation_unit: 8,
                            bytes_per_sector: 512,
                        }
                        .encode()
                    }
                    _ => return Err(NtStatus::NOT_SUPPORTED),
                }
                .map_err(|_| NtStatus::INVALID_PARAMETER)?;
                ok(Reply::QueryInfo(Smb2QueryInfoResponse { output_buffer }))
            }
            Request::SetInfo(req) => {
                let root = self.root.clone();
                let open = self
                    .opens
                    .get_mut(&resolve(req.file_id)?)
                    .ok_or(NtStatus::FILE_CLOSED)?;
                match req.file_info_class {
                    info_class::FILE_END_OF_FILE_INFORMATION => {
                        let bytes: [u8; 8] = req
                            .buffer
                            .get(..8)
                            .and_then(|b| b.try_into().ok())
                            .ok_or(NtStatus::INVALID_PARAMETER)?;
                        fs::OpenOptions::new()
                            .write(true)
                            .open(&open.path)
                            .and_then(|f| f.set_len(u64::from_le_bytes(bytes)))
                            .map_err(io_status)?;
                    }
                    info_class::FILE_RENAME_INFORMATION => {
                        let info = RenameInformation::parse(&req.buffer)
                            .map_err(|_| NtStatus::INVALID_PARAMETER)?;
                        let target = share_path(&root, &info.file_name);
                        if target.exists() && !info.replace_if_exists {
                            return Err(NtStatus::OBJECT_NAME_COLLISION);
                        }
                        fs::rename(&open.path, &target).map_err(io_status)?;
                        open.path = target;
                    }
                    info_class::FILE_DISPOSITION_INFORMATION => {
                        open.delete_on_close = req.buffer.first().is_some_and(|b| *b != 0);
                    }
                    _ => return Err(NtStatus::NOT_SUPPORTED),
                }
                ok(Reply::SetInfo)
            }
        }
    }

    fn create(
        &mut self,
        tree: Tree,
        req: &Smb2CreateRequest,
    ) -> std::result::Result<(FileId, Smb2CreateResponse), NtStatus> {
        let file_id = FileId::with_values(self.next_file, self.next_file);
        self.next_file += 1;

        if tree == Tree::Ipc {
            if !req.file_name.eq_ignore_ascii_case(srvsvc::PIPE_NAME) {
                return Err(NtStatus::OBJECT_NAME_NOT_FOUND);
            }
            self.opens.insert(
                file_id,
                Open {
                    path: PathBuf::from(srvsvc::PIPE_NAME),
                    kind: OpenKind::Pipe {
                        out: Vec::new(),
                        chunked: false,
                    },
                    delete_on_close: false,
                },
            );
            return Ok((
                file_id,
                Smb2CreateResponse {
                    oplock_level: 0,
                    flags: 0,
                    create_action: create_action::OPENED,
                    times: FileTimes::default(),
                    file_id,
                },
            ));
        }

        let path = share_path(&self.root, &req.file_name);
        let want_dir = req.create_options.contains(CreateOptions::FILE_DIRECTORY_FILE);
        let want_file = req.create_options.contains(CreateOptions::FILE_NON_DIRECTORY_FILE);
        let existing = fs::metadata(&path).ok();
        if path.parent().is_some_and(|p| !p.is_dir()) {
            return Err(NtStatus::OBJECT_PATH_NOT_FOUND);
        }

        let action = match (&existing, req.create_disposition) {
            (None, CreateDisposition::Open | CreateDisposition::Overwrite) => {
                return Err(NtStatus::OBJECT_NAME_NOT_FOUND)
            }
            (Some(_), CreateDisposition::Create) => return Err(NtStatus::OBJECT_NAME_COLLISION),
            (None, _) => {
                if want_dir {
                    fs::create_dir(&path).map_err(io_status)?;
                } else {
                    fs::File::create(&path).map_err(io_status)?;
                }
                create_action::CREATED
            }
            (Some(meta), disposition) => {
                if want_dir && !meta.is_dir() {
                    return Err(NtStatus::NOT_A_DIRECTORY);
                }
                if want_file && meta.is_dir() {
                    return Err(NtStatus::FILE_IS_A_DIRECTORY);
                }
                match disposition {
                    CreateDisposition::Overwrite
                    | CreateDisposition::OverwriteIf
                    | CreateDisposition::Supersede => {
                        fs::File::create(&path).map_err(io_status)?;
                        create_action::OVERWRITTEN
                    }
                    _ => create_action::OPENED,
                }
            }
        };

        let meta = fs::metadata(&path).map_err(io_status)?;
        let delete_on_close = req.create_options.contains(CreateOptions::FILE_DELETE_ON_CLOSE);
        if delete_on_close && meta.is_dir() {
            let mut children = fs::read_dir(&path).map_err(io_status)?;
            if children.next().is_some() {
                return Err(NtStatus::DIRECTORY_NOT_EMPTY);
            }
        }
        let kind = if meta.is_dir() {
            OpenKind::Dir { listed: false }
        } else {
            OpenKind::File
        };
        self.opens.insert(
            file_id,
            Open {
                path,
                kind,
                delete_on_close,
            },
        );
        Ok((
            file_id,
            Smb2CreateResponse {
                oplock_level: 0,
                flags: 0,
                create_action: action,
                times: file_times(&meta),
                file_id,
            },
        ))
    }
}

fn share_path(root: &Path, name: &str) -> PathBuf {
    name.split('\\')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Hand back up to `limit` pipe bytes; the rest waits for the next READ
fn drain_pipe(out: &mut Vec<u8>, limit: usize) -> (NtStatus, Vec<u8>) {
    let n = out.len().min(limit);
    let data: Vec<u8> = out.drain(..n).collect();
    let status = if out.is_empty() {
        NtStatus::SUCCESS
    } else {
        NtStatus::BUFFER_OVERFLOW
    };
    (status, data)
}

fn rpc_reply(request: &RequestPacket, fragment: usize) -> Result<Vec<u8>> {
    let stub = match request.opnum {
        srvsvc::OPNUM_NET_SHARE_ENUM_ALL => srvsvc::encode_share_enum_all_reply(&test_shares())?,
        srvsvc::OPNUM_NET_SHARE_GET_INFO => {
            let name = srvsvc::decode_share_get_info_request(&request.stub_data)?;
            let shares = test_shares();
            let found = shares.iter().find(|s| s.name.eq_ignore_ascii_case(&name));
            srvsvc::encode_share_get_info_reply(found.ok_or(NERR_NET_NAME_NOT_FOUND))?
        }
        _ => {
            return FaultPacket::new(request.call_id, request.context_id, fault::OP_RNG_ERROR)
                .serialize()
        }
    };

    let chunks: Vec<&[u8]> = stub.chunks(fragment.max(1)).collect();
    let mut out = Vec::new();
    let mut remaining = stub.len();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut flags = 0;
        if i == 0 {
            flags |= PacketFlags::FIRST_FRAG;
        }
        if i + 1 == chunks.len() {
            flags |= PacketFlags::LAST_FRAG;
        }
        let mut response = ResponsePacket::new(request.call_id, request.context_id, chunk.to_vec());
        response.flags = PacketFlags(flags);
        response.alloc_hint = remaining as u32;
        remaining -= chunk.len();
        out.extend_from_slice(&response.serialize()?);
    }
    Ok(out)
}
