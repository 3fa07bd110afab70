//! Path operations
//!
//! Each one is a single compounded frame: CREATE, optionally a QUERY_INFO or
//! SET_INFO against the related handle, then CLOSE. Every member reports into
//! shared state and the CLOSE completion, which always fires last, resolves
//! the call with the first error seen or the collected value.

use super::call::Call;
use super::context::{annotate, assert_attached, smb_path, Context};
use super::file::Stat;
use crate::error::{Error, Result};
use crate::protocol::messages::{
    FileAllInformation, FileId, FsFullSizeInformation, RenameInformation, Smb2CloseRequest,
    Smb2CreateRequest, Smb2QueryInfoRequest, Smb2SetInfoRequest,
};
use crate::protocol::smb2_constants::{
    limits, CreateDisposition, CreateOptions, DesiredAccess, FileAttributes, ShareAccess,
};
use crate::protocol::{Request, Response};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Longest file name component reported by `statvfs`
const NAME_MAX: u64 = 255;

/// Filesystem statistics in `statvfs(3)` terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatVfs {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub fsid: u64,
    pub flag: u64,
    pub namemax: u64,
}

impl From<&FsFullSizeInformation> for StatVfs {
    fn from(info: &FsFullSizeInformation) -> Self {
        let block = info.bytes_per_sector as u64 * info.sectors_per_allocation_unit as u64;
        Self {
            bsize: block,
            frsize: block,
            blocks: info.total_allocation_units,
            bfree: info.actual_available_allocation_units,
            bavail: info.caller_available_allocation_units,
            namemax: NAME_MAX,
            ..Self::default()
        }
    }
}

/// Middle member of a compound and how its reply becomes the result
struct Middle<T> {
    request: Request,
    decode: fn(Response) -> Result<T>,
}

struct Outcome<T> {
    error: Option<Error>,
    value: Option<T>,
}

impl<T> Outcome<T> {
    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
    }
}

impl Context {
    fn compound<T: 'static>(
        &self,
        what: String,
        create: Smb2CreateRequest,
        middle: Option<Middle<T>>,
        preset: Option<T>,
    ) -> Call<T> {
        let (completer, call) = Call::start(self.rc());
        let mut conn = self.rc().borrow_mut();
        let outcome = Rc::new(RefCell::new(Outcome {
            error: None,
            value: preset,
        }));

        let mut head = conn.build_pdu(Request::Create(create));
        let state = outcome.clone();
        head.on_complete(move |_, result| state.borrow_mut().record(result.map(|_| ())));

        if let Some(Middle { request, decode }) = middle {
            let mut pdu = conn.build_pdu(request);
            let state = outcome.clone();
            pdu.on_complete(move |_, result| {
                let mut state = state.borrow_mut();
                match result.and_then(decode) {
                    Ok(value) => state.value = Some(value),
                    Err(e) => state.record(Err(e)),
                }
            });
            head.add_compound(pdu);
        }

        let mut close = conn.build_pdu(Request::Close(Smb2CloseRequest::new(FileId::COMPOUND)));
        close.on_complete(move |conn, result| {
            let mut state = outcome.borrow_mut();
            state.record(result.map(|_| ()));
            let result = match (state.error.take(), state.value.take()) {
                (Some(e), _) => Err(annotate(e, || what)),
                (None, Some(value)) => Ok(value),
                (None, None) => Err(Error::Protocol(format!("{}: no reply data", what))),
            };
            drop(state);
            completer.finish(conn, result);
        });
        head.add_compound(close);

        conn.submit(head);
        call
    }

    pub fn stat(&self, path: &str) -> Call<Stat> {
        assert_attached(&self.rc().borrow(), "stat");
        let create = Smb2CreateRequest::new(smb_path(path))
            .access(DesiredAccess::FILE_READ_ATTRIBUTES)
            .share(ShareAccess::FILE_SHARE_ALL);
        let query = Smb2QueryInfoRequest::all_information(FileId::COMPOUND, limits::DEFAULT_OUTPUT_BUFFER);
        self.compound(
            format!("stat {}", path),
            create,
            Some(Middle {
                request: Request::QueryInfo(query),
                decode: |response| {
                    let reply = expect_reply!(response, QueryInfo)?;
                    Ok(Stat::from(&FileAllInformation::parse(&reply.output_buffer)?))
                },
            }),
            None,
        )
    }

    /// Statistics of the filesystem holding `path`
    pub fn statvfs(&self, path: &str) -> Call<StatVfs> {
        assert_attached(&self.rc().borrow(), "statvfs");
        let create = Smb2CreateRequest::new(smb_path(path))
            .access(DesiredAccess::FILE_READ_ATTRIBUTES)
            .share(ShareAccess::FILE_SHARE_ALL);
        let query = Smb2QueryInfoRequest::fs_full_size(FileId::COMPOUND, limits::DEFAULT_OUTPUT_BUFFER);
        self.compound(
            format!("statvfs {}", path),
            create,
            Some(Middle {
                request: Request::QueryInfo(query),
                decode: |response| {
                    let reply = expect_reply!(response, QueryInfo)?;
                    Ok(StatVfs::from(&FsFullSizeInformation::parse(&reply.output_buffer)?))
                },
            }),
            None,
        )
    }

    pub fn truncate(&self, path: &str, length: u64) -> Call<()> {
        assert_attached(&self.rc().borrow(), "truncate");
        let create = Smb2CreateRequest::new(smb_path(path))
            .access(DesiredAccess::FILE_WRITE_DATA)
            .options(CreateOptions::FILE_NON_DIRECTORY_FILE);
        let set = Smb2SetInfoRequest::end_of_file(FileId::COMPOUND, length);
        self.compound(
            format!("truncate {}", path),
            create,
            Some(Middle {
                request: Request::SetInfo(set),
                decode: |_| Ok(()),
            }),
            None,
        )
    }

    /// Rename `from` to `to`; an existing target is not replaced
    pub fn rename(&self, from: &str, to: &str) -> Call<()> {
        assert_attached(&self.rc().borrow(), "rename");
        debug!("rename {} -> {}", from, to);
        let create = Smb2CreateRequest::new(smb_path(from))
            .access(DesiredAccess::DELETE | DesiredAccess::FILE_READ_ATTRIBUTES)
            .share(ShareAccess::FILE_SHARE_ALL);
        let info = RenameInformation {
            replace_if_exists: false,
            file_name: smb_path(to),
        };
        let set = match Smb2SetInfoRequest::rename(FileId::COMPOUND, &info) {
            Ok(set) => set,
            Err(e) => return Call::ready(self.rc(), Err(e)),
        };
        self.compound(
            format!("rename {}", from),
            create,
            Some(Middle {
                request: Request::SetInfo(set),
                decode: |_| Ok(()),
            }),
            None,
        )
    }

    /// Delete a file
    pub fn unlink(&self, path: &str) -> Call<()> {
        assert_attached(&self.rc().borrow(), "unlink");
        let create = Smb2CreateRequest::new(smb_path(path))
            .access(DesiredAccess::DELETE)
            .share(ShareAccess::FILE_SHARE_ALL)
            .options(CreateOptions::FILE_NON_DIRECTORY_FILE | CreateOptions::FILE_DELETE_ON_CLOSE);
        self.compound(format!("unlink {}", path), create, None, Some(()))
    }

    /// Delete an empty directory
    pub fn rmdir(&self, path: &str) -> Call<()> {
        assert_attached(&self.rc().borrow(), "rmdir");
        let create = Smb2CreateRequest::new(smb_path(path))
            .access(DesiredAccess::DELETE)
            .share(ShareAccess::FILE_SHARE_ALL)
            .options(CreateOptions::FILE_DIRECTORY_FILE | CreateOptions::FILE_DELETE_ON_CLOSE);
        self.compound(format!("rmdir {}", path), create, None, Some(()))
    }

    pub fn mkdir(&self, path: &str) -> Call<()> {
        assert_attached(&self.rc().borrow(), "mkdir");
        let mut create = Smb2CreateRequest::new(smb_path(path))
            .access(DesiredAccess::FILE_READ_ATTRIBUTES)
            .disposition(CreateDisposition::Create)
            .options(CreateOptions::FILE_DIRECTORY_FILE)
            .share(ShareAccess::FILE_SHARE_READ | ShareAccess::FILE_SHARE_WRITE);
        create.file_attributes = FileAttributes::DIRECTORY;
        self.compound(format!("mkdir {}", path), create, None, Some(()))
    }
}
