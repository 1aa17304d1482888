use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected tracker stream. Implements `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations. It
/// wraps a TCP stream and remembers the remote address for diagnostics.
pub struct TrackerStream {
    inner: TcpStream,
    peer_addr: SocketAddr,
}

impl Read for TrackerStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TrackerStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl TrackerStream {
    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            inner: stream,
            peer_addr,
        })
    }

    /// Remote address of the tracker.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Local address of this end of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Disable Nagle's algorithm; responses are small and latency bound.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer_addr: self.peer_addr,
        })
    }

    /// Shut down both halves of the connection.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown(Shutdown::Both).map_err(Into::into)
    }

    /// Consume the wrapper and return the raw TCP stream.
    pub fn into_inner(self) -> TcpStream {
        self.inner
    }
}

impl std::fmt::Debug for TrackerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerStream")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
