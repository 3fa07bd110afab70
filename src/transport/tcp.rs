//! Non-blocking TCP transport for SMB2

use super::framing::split_frame;
use crate::error::{Error, Result};
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;
use tracing::{debug, trace};

/// Size of each read from the socket
const READ_CHUNK: usize = 64 * 1024;

/// TCP transport for SMB protocol.
///
/// The socket is connected with a blocking, time-bounded connect and then
/// switched to non-blocking mode; every read and write afterwards stops at
/// `WouldBlock` and leaves readiness tracking to the caller.
pub struct TcpTransport {
    stream: TcpStream,
    read_buffer: BytesMut,
    remote_addr: SocketAddr,
}

impl TcpTransport {
    /// Connect to `host:port`, trying each resolved address in turn
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        let addrs = (host, port).to_socket_addrs()?;
        let mut last_err = None;

        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.map(Error::Io).unwrap_or_else(|| {
            Error::InvalidParameter(format!("{} did not resolve to any address", host))
        }))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let remote_addr = stream.peer_addr()?;
        Ok(Self {
            stream,
            read_buffer: BytesMut::with_capacity(READ_CHUNK),
            remote_addr,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Read everything the socket has buffered.
    ///
    /// Returns the number of bytes read; end of stream is reported as
    /// `ConnectionClosed` since the server never closes a healthy session.
    /// Bytes that arrived just before the close are returned first so the
    /// replies they carry are still delivered.
    pub fn fill(&mut self) -> Result<usize> {
        let mut total = 0;
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) if total > 0 => break,
                Ok(0) => {
                    debug!("peer {} closed the connection", self.remote_addr);
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        trace!("read {} bytes from {}", total, self.remote_addr);
        Ok(total)
    }

    /// Next complete frame payload from the read buffer, if any
    pub fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        split_frame(&mut self.read_buffer)
    }

    /// Write as much of `data` as the socket accepts; `Ok(0)` means it would block
    pub fn write_some(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.stream.write(data) {
                Ok(0) if !data.is_empty() => return Err(Error::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn shutdown(&self) {
        // The peer may already be gone; nothing useful to report.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl AsRawFd for TcpTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl AsFd for TcpTransport {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}
