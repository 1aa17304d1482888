use std::fmt;

/// Which checksum failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumScope {
    /// XOR-fold over the first 15 bytes of an NTCB header.
    Header,
    /// XOR-fold over an NTCB payload.
    Body,
    /// CRC-8 trailer of a FLEX message.
    Crc8,
}

impl fmt::Display for ChecksumScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumScope::Header => f.write_str("header"),
            ChecksumScope::Body => f.write_str("body"),
            ChecksumScope::Crc8 => f.write_str("crc-8"),
        }
    }
}

/// Coarse classification of protocol failures.
///
/// Every kind is fatal to the connection it occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown message prefix, malformed preamble or truncated field.
    Framing,
    /// Header, body or CRC-8 mismatch.
    Checksum,
    /// Unexpected constant or out-of-range field value.
    Protocol,
    /// No handler registered for a parsed identifier.
    Dispatch,
    /// Transport failure or peer closed the stream.
    Io,
}

/// Errors that can occur while decoding tracker messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// No handler is registered for the first byte of a message.
    #[error("unknown message prefix 0x{0:02X}")]
    UnknownPrefix(u8),

    /// A fixed ASCII preamble or prefix did not match.
    #[error("{context} does not match (expected {expected:?})")]
    InvalidPreamble {
        context: &'static str,
        expected: &'static str,
    },

    /// A field extends past the end of the received message.
    #[error("message truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A handler asked for more bytes than the configured message limit.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A checksum did not verify.
    #[error("{scope} checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    Checksum {
        scope: ChecksumScope,
        expected: u8,
        actual: u8,
    },

    /// A field carried a value the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// No NTCB body handler matches the payload identifier.
    #[error("no body handler for NTCB payload starting {0:?}")]
    UnknownBody(String),

    /// No FLEX sub-handler is registered for the second byte.
    #[error("unknown FLEX message identifier 0x{0:02X}")]
    UnknownSubMessage(u8),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

impl FrameError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::UnknownPrefix(_)
            | FrameError::InvalidPreamble { .. }
            | FrameError::Truncated { .. }
            | FrameError::MessageTooLarge { .. } => ErrorKind::Framing,
            FrameError::Checksum { .. } => ErrorKind::Checksum,
            FrameError::Protocol(_) => ErrorKind::Protocol,
            FrameError::UnknownBody(_) | FrameError::UnknownSubMessage(_) => ErrorKind::Dispatch,
            FrameError::Io(_) | FrameError::ConnectionClosed => ErrorKind::Io,
        }
    }

    pub(crate) fn checksum(scope: ChecksumScope, expected: u8, actual: u8) -> Self {
        FrameError::Checksum {
            scope,
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(FrameError::UnknownPrefix(0).kind(), ErrorKind::Framing);
        assert_eq!(
            FrameError::checksum(ChecksumScope::Crc8, 1, 2).kind(),
            ErrorKind::Checksum
        );
        assert_eq!(
            FrameError::Protocol("bad".to_string()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(FrameError::UnknownSubMessage(b'Z').kind(), ErrorKind::Dispatch);
        assert_eq!(FrameError::ConnectionClosed.kind(), ErrorKind::Io);
    }

    #[test]
    fn messages_name_the_failure() {
        let err = FrameError::checksum(ChecksumScope::Header, 0x10, 0x20);
        assert_eq!(
            err.to_string(),
            "header checksum mismatch (expected 0x10, got 0x20)"
        );
        assert_eq!(
            FrameError::UnknownPrefix(0x00).to_string(),
            "unknown message prefix 0x00"
        );
    }
}
