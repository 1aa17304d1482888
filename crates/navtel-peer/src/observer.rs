use std::net::SocketAddr;

use navtel_frame::{CompletedCrash, SessionState};
use serde::Serialize;

/// Identity of one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Server-assigned id, `conn-N`.
    pub id: String,
    /// Remote address, when the stream has one.
    pub peer_addr: Option<SocketAddr>,
}

impl ConnectionInfo {
    pub fn new(id: impl Into<String>, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id: id.into(),
            peer_addr,
        }
    }
}

/// Counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Complete messages handled.
    pub messages: u64,
    /// Bytes received in complete messages.
    pub bytes_received: u64,
    /// Crash files fully received.
    pub crash_files: u64,
    /// Crash status queries sent by the crash trigger.
    pub crash_queries: u64,
}

/// Receives notifications from connection drivers.
///
/// Called from connection threads (or tasks), so implementations must be
/// thread-safe. All methods default to doing nothing.
pub trait SessionObserver: Send + Sync {
    /// A connection was accepted.
    fn connection_opened(&self, _info: &ConnectionInfo) {}

    /// A complete message was received and answered.
    fn message_received(&self, _info: &ConnectionInfo, _session: &SessionState, _message: &[u8]) {}

    /// A crash file finished transferring. Fires once per transfer.
    fn crash_transfer_complete(
        &self,
        _info: &ConnectionInfo,
        _session: &SessionState,
        _crash: &CompletedCrash,
    ) {
    }

    /// A connection ended, cleanly or with `error`.
    fn connection_closed(
        &self,
        _info: &ConnectionInfo,
        _stats: &ConnectionStats,
        _error: Option<&crate::PeerError>,
    ) {
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
