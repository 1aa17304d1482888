/// Errors that can occur while serving tracker connections.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] navtel_transport::TransportError),

    /// Protocol or stream error on a connection.
    #[error("frame error: {0}")]
    Frame(#[from] navtel_frame::FrameError),

    /// A connection thread could not be started.
    #[error("failed to spawn connection worker: {0}")]
    Spawn(std::io::Error),
}

impl PeerError {
    /// Whether this is the peer closing mid-message or an I/O failure, as
    /// opposed to a protocol violation.
    pub fn is_io(&self) -> bool {
        match self {
            PeerError::Frame(err) => err.kind() == navtel_frame::ErrorKind::Io,
            PeerError::Transport(_) | PeerError::Spawn(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
