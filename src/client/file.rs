//! Open files
//!
//! A [`FileHandle`] is a wire `FileId` plus a weak reference to its
//! connection. Offset and cached size live in the connection's arena, so
//! every handle for the same `FileId` sees the same state. Closing removes
//! the arena entry; later operations fail locally with `InvalidHandle`.

use super::call::Call;
use super::connection::Connection;
use super::context::{annotate, assert_attached, issue, parent, smb_path, Context};
use crate::error::{Error, Result};
use crate::protocol::messages::{
    FileAllInformation, FileId, Smb2CloseRequest, Smb2CreateRequest, Smb2FlushRequest,
    Smb2QueryInfoRequest, Smb2ReadRequest, Smb2SetInfoRequest, Smb2WriteRequest,
};
use crate::protocol::smb2_constants::{
    limits, CreateDisposition, CreateOptions, DesiredAccess, FileAttributes,
};
use crate::protocol::{NtStatus, Request};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// 100ns intervals between 1601-01-01 and 1970-01-01
const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

/// Convert a Windows FILETIME to UTC; times before 1970 clamp to the epoch
pub fn filetime_to_datetime(filetime: u64) -> DateTime<Utc> {
    let since_epoch = filetime.saturating_sub(FILETIME_UNIX_EPOCH);
    let secs = (since_epoch / 10_000_000) as i64;
    let nanos = ((since_epoch % 10_000_000) * 100) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_default()
}

bitflags! {
    /// How [`Context::open`] opens a file
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ      = 0x01;
        const WRITE     = 0x02;
        const CREATE    = 0x04;
        /// With CREATE: fail if the file exists
        const EXCLUSIVE = 0x08;
        const TRUNCATE  = 0x10;
        /// Write through to stable storage
        const SYNC      = 0x20;
    }
}

impl OpenFlags {
    pub(crate) fn desired_access(self) -> DesiredAccess {
        let mut access = DesiredAccess::FILE_READ_ATTRIBUTES;
        if self.contains(OpenFlags::READ) || !self.contains(OpenFlags::WRITE) {
            access |= DesiredAccess::FILE_GENERIC_READ;
        }
        if self.contains(OpenFlags::WRITE) {
            access |= DesiredAccess::FILE_GENERIC_WRITE;
        }
        access
    }

    pub(crate) fn disposition(self) -> CreateDisposition {
        let create = self.contains(OpenFlags::CREATE);
        if create && self.contains(OpenFlags::EXCLUSIVE) {
            CreateDisposition::Create
        } else if create && self.contains(OpenFlags::TRUNCATE) {
            CreateDisposition::OverwriteIf
        } else if create {
            CreateDisposition::OpenIf
        } else if self.contains(OpenFlags::TRUNCATE) {
            CreateDisposition::Overwrite
        } else {
            CreateDisposition::Open
        }
    }

    pub(crate) fn create_options(self) -> CreateOptions {
        let mut options = CreateOptions::FILE_NON_DIRECTORY_FILE;
        if self.contains(OpenFlags::SYNC) {
            options |= CreateOptions::FILE_WRITE_THROUGH;
        }
        options
    }
}

/// Origin for [`FileHandle::lseek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Link,
}

impl FileType {
    pub(crate) fn from_attributes(attributes: u32) -> Self {
        let attributes = FileAttributes::from_bits_truncate(attributes);
        if attributes.contains(FileAttributes::REPARSE_POINT) {
            FileType::Link
        } else if attributes.contains(FileAttributes::DIRECTORY) {
            FileType::Directory
        } else {
            FileType::File
        }
    }
}

/// File metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub file_type: FileType,
    pub nlink: u32,
    pub ino: u64,
    pub size: u64,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
    pub btime: DateTime<Utc>,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

impl From<&FileAllInformation> for Stat {
    fn from(info: &FileAllInformation) -> Self {
        let file_type = match FileType::from_attributes(info.file_attributes) {
            FileType::File if info.directory => FileType::Directory,
            other => other,
        };
        Self {
            file_type,
            nlink: info.number_of_links,
            ino: info.index_number,
            size: info.end_of_file,
            atime: filetime_to_datetime(info.last_access_time),
            mtime: filetime_to_datetime(info.last_write_time),
            ctime: filetime_to_datetime(info.change_time),
            btime: filetime_to_datetime(info.creation_time),
        }
    }
}

/// Arena entry for one open file
#[derive(Debug, Clone)]
pub(crate) struct FileState {
    pub(crate) path: String,
    pub(crate) offset: u64,
    pub(crate) end_of_file: u64,
}

/// An open file on the attached share
#[derive(Debug, Clone)]
pub struct FileHandle {
    conn: Weak<RefCell<Connection>>,
    file_id: FileId,
}

impl FileHandle {
    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Path the file was opened with, or `None` once closed
    pub fn path(&self) -> Option<String> {
        self.with_state(|state| state.path.clone())
    }

    pub fn is_open(&self) -> bool {
        self.with_state(|_| ()).is_some()
    }

    /// Current offset used by `read` and `write`
    pub fn offset(&self) -> Option<u64> {
        self.with_state(|state| state.offset)
    }

    fn with_state<T>(&self, f: impl FnOnce(&FileState) -> T) -> Option<T> {
        parent(&self.conn).borrow().files.get(&self.file_id).map(f)
    }

    fn closed(&self) -> Error {
        Error::InvalidHandle(format!(
            "file {:x}:{:x} is closed",
            self.file_id.persistent, self.file_id.volatile
        ))
    }

    /// Connection plus the (path, offset) of this file, or a ready error
    fn open_state<T>(&self) -> std::result::Result<(Rc<RefCell<Connection>>, String, u64), Call<T>> {
        let conn = parent(&self.conn);
        let state = conn
            .borrow()
            .files
            .get(&self.file_id)
            .map(|state| (state.path.clone(), state.offset));
        match state {
            Some((path, offset)) => Ok((conn, path, offset)),
            None => {
                let err = self.closed();
                Err(Call::ready(&conn, Err(err)))
            }
        }
    }

    /// Read up to `count` bytes at the current offset and advance it.
    ///
    /// `count` is clamped to the negotiated maximum read size; an empty
    /// result means end of file.
    pub fn read(&self, count: usize) -> Call<Vec<u8>> {
        match self.open_state() {
            Ok((conn, path, offset)) => self.read_at(&conn, path, count, offset, true),
            Err(call) => call,
        }
    }

    /// Read up to `count` bytes at `offset`, leaving the current offset alone
    pub fn pread(&self, count: usize, offset: u64) -> Call<Vec<u8>> {
        match self.open_state() {
            Ok((conn, path, _)) => self.read_at(&conn, path, count, offset, false),
            Err(call) => call,
        }
    }

    fn read_at(
        &self,
        conn: &Rc<RefCell<Connection>>,
        path: String,
        count: usize,
        offset: u64,
        advance: bool,
    ) -> Call<Vec<u8>> {
        let count = count.min(conn.borrow().negotiated.max_read_size as usize);
        if count == 0 {
            return Call::ready(conn, Ok(Vec::new()));
        }
        let file_id = self.file_id;
        let request = Smb2ReadRequest::new(file_id, offset, count as u32);
        issue(conn, Request::Read(request), move |conn, result| {
            let data = match result.and_then(|response| expect_reply!(response, Read)) {
                Ok(reply) => reply.data,
                Err(e) if e.nt_status() == Some(NtStatus::END_OF_FILE) => Vec::new(),
                Err(e) => return Err(annotate(e, || format!("read {}", path))),
            };
            if advance {
                if let Some(state) = conn.files.get_mut(&file_id) {
                    state.offset = offset + data.len() as u64;
                }
            }
            Ok(data)
        })
    }

    /// Write at the current offset and advance it; returns the bytes taken.
    ///
    /// At most the negotiated maximum write size is sent per call.
    pub fn write(&self, data: &[u8]) -> Call<usize> {
        match self.open_state() {
            Ok((conn, path, offset)) => self.write_at(&conn, path, data, offset, true),
            Err(call) => call,
        }
    }

    pub fn pwrite(&self, data: &[u8], offset: u64) -> Call<usize> {
        match self.open_state() {
            Ok((conn, path, _)) => self.write_at(&conn, path, data, offset, false),
            Err(call) => call,
        }
    }

    fn write_at(
        &self,
        conn: &Rc<RefCell<Connection>>,
        path: String,
        data: &[u8],
        offset: u64,
        advance: bool,
    ) -> Call<usize> {
        let len = data.len().min(conn.borrow().negotiated.max_write_size as usize);
        if len == 0 {
            return Call::ready(conn, Ok(0));
        }
        let file_id = self.file_id;
        let request = Smb2WriteRequest::new(file_id, offset, data[..len].to_vec());
        issue(conn, Request::Write(request), move |conn, result| {
            let reply = result
                .and_then(|response| expect_reply!(response, Write))
                .map_err(|e| annotate(e, || format!("write {}", path)))?;
            let written = reply.count as u64;
            if let Some(state) = conn.files.get_mut(&file_id) {
                if advance {
                    state.offset = offset + written;
                }
                state.end_of_file = state.end_of_file.max(offset + written);
            }
            Ok(reply.count as usize)
        })
    }

    /// Move the current offset; `End` is relative to the cached file size
    pub fn lseek(&self, offset: i64, whence: Whence) -> Result<u64> {
        let conn = parent(&self.conn);
        let mut conn = conn.borrow_mut();
        let Some(state) = conn.files.get_mut(&self.file_id) else {
            return Err(self.closed());
        };
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => state.offset,
            Whence::End => state.end_of_file,
        };
        let target = u64::try_from(base as i128 + offset as i128).map_err(|_| {
            Error::InvalidParameter(format!("seek to {} from {:?} is out of range", offset, whence))
        })?;
        state.offset = target;
        Ok(target)
    }

    /// FLUSH buffered server-side data
    pub fn fsync(&self) -> Call<()> {
        let (conn, path, _) = match self.open_state() {
            Ok(state) => state,
            Err(call) => return call,
        };
        let request = Smb2FlushRequest {
            file_id: self.file_id,
        };
        issue(&conn, Request::Flush(request), move |_, result| {
            result
                .map(|_| ())
                .map_err(|e| annotate(e, || format!("fsync {}", path)))
        })
    }

    pub fn fstat(&self) -> Call<Stat> {
        let (conn, path, _) = match self.open_state() {
            Ok(state) => state,
            Err(call) => return call,
        };
        let file_id = self.file_id;
        let request = Smb2QueryInfoRequest::all_information(file_id, limits::DEFAULT_OUTPUT_BUFFER);
        issue(&conn, Request::QueryInfo(request), move |conn, result| {
            let reply = result
                .and_then(|response| expect_reply!(response, QueryInfo))
                .map_err(|e| annotate(e, || format!("fstat {}", path)))?;
            let info = FileAllInformation::parse(&reply.output_buffer)?;
            if let Some(state) = conn.files.get_mut(&file_id) {
                state.end_of_file = info.end_of_file;
            }
            Ok(Stat::from(&info))
        })
    }

    /// Set the file size to `length`
    pub fn ftruncate(&self, length: u64) -> Call<()> {
        let (conn, path, _) = match self.open_state() {
            Ok(state) => state,
            Err(call) => return call,
        };
        let file_id = self.file_id;
        let request = Smb2SetInfoRequest::end_of_file(file_id, length);
        issue(&conn, Request::SetInfo(request), move |conn, result| {
            result.map_err(|e| annotate(e, || format!("ftruncate {}", path)))?;
            if let Some(state) = conn.files.get_mut(&file_id) {
                state.end_of_file = length;
            }
            Ok(())
        })
    }

    /// CLOSE the file; closing an already closed handle does nothing
    pub fn close(&self) -> Call<()> {
        let conn = parent(&self.conn);
        let removed = conn.borrow_mut().files.remove(&self.file_id);
        let Some(state) = removed else {
            return Call::ready(&conn, Ok(()));
        };
        debug!("closing {}", state.path);
        let request = Smb2CloseRequest::new(self.file_id);
        issue(&conn, Request::Close(request), move |_, result| {
            result
                .map(|_| ())
                .map_err(|e| annotate(e, || format!("close {}", state.path)))
        })
    }
}

impl Context {
    /// CREATE `path` according to `flags`
    pub fn open(&self, path: &str, flags: OpenFlags) -> Call<FileHandle> {
        assert_attached(&self.rc().borrow(), "open");
        let weak = Rc::downgrade(self.rc());
        let request = Smb2CreateRequest::new(smb_path(path))
            .access(flags.desired_access())
            .disposition(flags.disposition())
            .options(flags.create_options());
        let path = path.to_string();

        issue(self.rc(), Request::Create(request), move |conn, result| {
            let reply = result
                .and_then(|response| expect_reply!(response, Create))
                .map_err(|e| annotate(e, || format!("open {}", path)))?;
            debug!("opened {} as {:?}", path, reply.file_id);
            conn.files.insert(
                reply.file_id,
                FileState {
                    path,
                    offset: 0,
                    end_of_file: reply.times.end_of_file,
                },
            );
            Ok(FileHandle {
                conn: weak,
                file_id: reply.file_id,
            })
        })
    }

    /// Handle for a file this context still has open
    pub fn file_handle_from_id(&self, file_id: FileId) -> Option<FileHandle> {
        self.rc()
            .borrow()
            .files
            .contains_key(&file_id)
            .then(|| FileHandle {
                conn: Rc::downgrade(self.rc()),
                file_id,
            })
    }
}
