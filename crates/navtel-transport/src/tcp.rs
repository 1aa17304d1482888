use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::TrackerStream;

/// TCP listening socket for tracker connections.
///
/// Provides bind/accept/connect over IPv4 and IPv6. Binding to port 0 picks
/// an ephemeral port; use [`TcpServerSocket::local_addr`] to discover it.
pub struct TcpServerSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServerSocket {
    /// Bind and listen on the given address (e.g. `0.0.0.0:5221`).
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let label = addr.to_string();
        let resolved = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Bind {
                addr: label.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::Unresolved(label.clone()))?;

        let listener = TcpListener::bind(resolved).map_err(|e| TransportError::Bind {
            addr: label.clone(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: label,
            source: e,
        })?;

        info!(%local_addr, "listening for tracker connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection.
    ///
    /// Blocks unless the listener is non-blocking, in which case an idle
    /// listener yields `TransportError::Accept` with `WouldBlock`. Accepted
    /// streams are always blocking.
    pub fn accept(&self) -> Result<TrackerStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        debug!(peer = %addr, "accepted connection");
        TrackerStream::from_tcp(stream)
    }

    /// Connect to a listening server (blocking). Used by tests and tools
    /// that play the tracker side.
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<TrackerStream> {
        let label = addr.to_string();
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: label.clone(),
            source: e,
        })?;
        debug!(addr = %label, "connected to server");
        TrackerStream::from_tcp(stream)
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Switch the listener into non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// Convert into a tokio listener for the async connection driver.
    #[cfg(feature = "async")]
    pub fn into_tokio(self) -> Result<tokio::net::TcpListener> {
        self.listener.set_nonblocking(true)?;
        tokio::net::TcpListener::from_std(self.listener).map_err(Into::into)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl std::fmt::Debug for TcpServerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServerSocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
