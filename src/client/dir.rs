//! Directory listings
//!
//! `opendir` reads the whole listing up front and closes the wire handle
//! before the [`Dir`] is handed out; reading, seeking and closing are local.

use super::call::{Call, Completer};
use super::connection::Connection;
use super::context::{annotate, assert_attached, smb_path, Context};
use super::file::{filetime_to_datetime, FileType, Stat};
use crate::error::Result;
use crate::protocol::messages::{
    DirectoryEntry, FileId, Smb2CloseRequest, Smb2CreateRequest, Smb2QueryDirectoryRequest,
};
use crate::protocol::smb2_constants::{limits, CreateOptions, DesiredAccess, ShareAccess};
use crate::protocol::{NtStatus, Request};
use tracing::{debug, trace};

/// One directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    pub stat: Stat,
}

impl From<DirectoryEntry> for Dirent {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            stat: Stat {
                file_type: FileType::from_attributes(entry.file_attributes),
                nlink: 0,
                ino: entry.file_id,
                size: entry.end_of_file,
                atime: filetime_to_datetime(entry.last_access_time),
                mtime: filetime_to_datetime(entry.last_write_time),
                ctime: filetime_to_datetime(entry.change_time),
                btime: filetime_to_datetime(entry.creation_time),
            },
            name: entry.name,
        }
    }
}

/// Snapshot of a directory listing
#[derive(Debug, Clone, Default)]
pub struct Dir {
    entries: Vec<Dirent>,
    position: usize,
    closed: bool,
}

impl Dir {
    pub(crate) fn new(entries: Vec<Dirent>) -> Self {
        Self {
            entries,
            position: 0,
            closed: false,
        }
    }

    /// Next entry, or `None` at the end or after `close`
    pub fn read(&mut self) -> Option<&Dirent> {
        if self.closed {
            return None;
        }
        let entry = self.entries.get(self.position)?;
        self.position += 1;
        Some(entry)
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn tell(&self) -> usize {
        self.position
    }

    /// Position the next `read`; past the end reads nothing
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.entries.len());
    }

    /// Release the listing; closing twice is harmless
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.entries.clear();
            self.position = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Dirent] {
        &self.entries
    }
}

/// An enumeration in progress
struct Listing {
    path: String,
    file_id: FileId,
    entries: Vec<Dirent>,
    completer: Completer<Dir>,
}

impl Context {
    /// Read the listing of `path`
    pub fn opendir(&self, path: &str) -> Call<Dir> {
        assert_attached(&self.rc().borrow(), "opendir");
        let (completer, call) = Call::start(self.rc());
        let mut conn = self.rc().borrow_mut();

        let request = Smb2CreateRequest::new(smb_path(path))
            .access(
                DesiredAccess::FILE_READ_DATA
                    | DesiredAccess::FILE_READ_ATTRIBUTES
                    | DesiredAccess::SYNCHRONIZE,
            )
            .options(CreateOptions::FILE_DIRECTORY_FILE)
            .share(ShareAccess::FILE_SHARE_ALL);
        let mut pdu = conn.build_pdu(Request::Create(request));
        let path = path.to_string();
        pdu.on_complete(move |conn, result| {
            match result.and_then(|response| expect_reply!(response, Create)) {
                Ok(reply) => query(
                    conn,
                    Listing {
                        path,
                        file_id: reply.file_id,
                        entries: Vec::new(),
                        completer,
                    },
                ),
                Err(e) => completer.finish(conn, Err(annotate(e, || format!("opendir {}", path)))),
            }
        });
        conn.submit(pdu);
        call
    }
}

fn query(conn: &mut Connection, mut listing: Listing) {
    let request = Smb2QueryDirectoryRequest::new(listing.file_id, limits::DEFAULT_OUTPUT_BUFFER);
    let mut pdu = conn.build_pdu(Request::QueryDirectory(request));
    pdu.on_complete(move |conn, result| {
        let batch = result
            .and_then(|response| expect_reply!(response, QueryDirectory))
            .and_then(|reply| reply.entries());
        match batch {
            Ok(batch) if batch.is_empty() => close(conn, listing, Ok(())),
            Ok(batch) => {
                trace!("{}: {} more entries", listing.path, batch.len());
                listing.entries.extend(batch.into_iter().map(Dirent::from));
                query(conn, listing);
            }
            Err(e) if e.nt_status() == Some(NtStatus::NO_MORE_FILES) => {
                close(conn, listing, Ok(()))
            }
            Err(e) => close(conn, listing, Err(e)),
        }
    });
    conn.submit(pdu);
}

fn close(conn: &mut Connection, listing: Listing, outcome: Result<()>) {
    let Listing {
        path,
        file_id,
        entries,
        completer,
    } = listing;
    let mut pdu = conn.build_pdu(Request::Close(Smb2CloseRequest::new(file_id)));
    pdu.on_complete(move |conn, result| {
        let result = outcome
            .and(result.map(|_| ()))
            .map(|()| {
                debug!("{}: {} entries", path, entries.len());
                Dir::new(entries)
            })
            .map_err(|e| annotate(e, || format!("opendir {}", path)));
        completer.finish(conn, result);
    });
    conn.submit(pdu);
}
