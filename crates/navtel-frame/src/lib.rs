//! Sans-I/O decoder for the Navtelecom tracker protocols.
//!
//! This is the core of navtel. A connection is a sequence of messages, each
//! selected by its first byte:
//! - `0x40` (`@`): NTCB envelope, a fixed 16-byte header followed by a body
//!   dispatched on its leading ASCII identifier
//! - `0x7E` (`~`): FLEX telemetry, dispatched on the second byte
//! - `0x7F`: keep-alive ping, no response
//!
//! Handlers never perform I/O. They are asked how many more bytes they need
//! given everything received so far ([`PacketHandler::pending_bytes`]); zero
//! means the message is complete and the response buffer is ready to flush.

pub mod checksum;
pub mod codec;
pub mod config;
pub mod crash;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod layout;
pub mod ping;
pub mod reader;
pub mod response;
pub mod session;
pub mod telemetry;
pub mod trie;
pub mod trigger;
pub mod writer;

pub use checksum::{crc8, xor_fold};
pub use codec::{EnvelopeHeader, HEADER_SIZE, PREAMBLE};
pub use config::{StreamConfig, TelemetryConfig, DEFAULT_MAX_CRASH_SIZE, DEFAULT_MAX_MESSAGE};
pub use crash::{CompletedCrash, CrashTransfer, CRASH_DATA_QUERY_PREFIX, CRASH_STATUS_QUERY};
pub use dispatch::{Decoded, Dispatcher};
pub use envelope::{BodyHandler, EnvelopeHandler, IdentityBody, NegotiationBody};
pub use error::{ChecksumScope, ErrorKind, FrameError, Result};
pub use handler::PacketHandler;
pub use layout::{record_size, FieldMask, FIELD_COUNT, FIELD_WIDTHS};
pub use ping::PingHandler;
pub use reader::{next_read, MessageReader};
pub use response::ResponseBuffer;
pub use session::{SessionEvent, SessionState};
pub use telemetry::{MessageHandler, TelemetryHandler};
pub use trigger::detect_crash_signal;
pub use writer::ResponseWriter;

/// First byte of an NTCB envelope message (`@`).
pub const ENVELOPE_PREFIX: u8 = 0x40;

/// First byte of a FLEX telemetry message (`~`).
pub const TELEMETRY_PREFIX: u8 = 0x7E;

/// First byte of a keep-alive ping.
pub const PING_PREFIX: u8 = 0x7F;
