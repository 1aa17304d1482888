//! FLEX telemetry handler (`~` messages).
//!
//! The second byte of a FLEX message selects a sub-handler. Every sub-message
//! ends with a CRC-8 over all preceding bytes, `~` prefix included, and all
//! offsets used by the sub-handlers are absolute within the message.

mod batch;
mod crash_data;
mod crash_info;
mod event;

pub use batch::BatchHandler;
pub use crash_data::CrashDataHandler;
pub use crash_info::CrashInfoHandler;
pub use event::EventHandler;

use crate::checksum::crc8;
use crate::config::TelemetryConfig;
use crate::error::{ChecksumScope, FrameError, Result};
use crate::handler::PacketHandler;
use crate::response::ResponseBuffer;
use crate::session::SessionState;
use crate::TELEMETRY_PREFIX;

/// Handler for one FLEX sub-message, keyed by its second byte.
///
/// Same contract as [`PacketHandler`]: `received` always holds the whole
/// message so far, starting with the `~` prefix.
pub trait MessageHandler: Send + Sync {
    /// Second byte this handler is registered under.
    fn identifier(&self) -> u8;

    /// Number of additional bytes needed, or zero when the message is done.
    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize>;
}

/// Top-level handler for `~` messages with a 256-slot sub-handler table.
pub struct TelemetryHandler {
    handlers: [Option<Box<dyn MessageHandler>>; 256],
}

impl Default for TelemetryHandler {
    fn default() -> Self {
        Self::standard(TelemetryConfig::default())
    }
}

impl TelemetryHandler {
    /// Handler with an empty sub-handler table.
    pub fn new() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// Handler with the `A`, `T`, `I` and `D` sub-handlers registered.
    pub fn standard(config: TelemetryConfig) -> Self {
        Self::new()
            .with_handler(BatchHandler)
            .with_handler(EventHandler)
            .with_handler(CrashInfoHandler::new(config))
            .with_handler(CrashDataHandler)
    }

    pub fn with_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.register(Box::new(handler));
        self
    }

    /// Register a sub-handler, replacing any handler on the same byte.
    pub fn register(&mut self, handler: Box<dyn MessageHandler>) {
        let slot = usize::from(handler.identifier());
        self.handlers[slot] = Some(handler);
    }

    /// Sub-handler registered for `identifier`, if any.
    pub fn handler_for(&self, identifier: u8) -> Option<&dyn MessageHandler> {
        self.handlers[usize::from(identifier)].as_deref()
    }
}

impl PacketHandler for TelemetryHandler {
    fn identifier(&self) -> u8 {
        TELEMETRY_PREFIX
    }

    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize> {
        let Some(&sub) = received.get(1) else {
            return Ok(2 - received.len());
        };

        let handler = self
            .handler_for(sub)
            .ok_or(FrameError::UnknownSubMessage(sub))?;
        handler.pending_bytes(state, received, response)
    }
}

/// Check the trailing CRC-8 of a complete sub-message.
pub(crate) fn verify_crc(message: &[u8]) -> Result<()> {
    let Some((&actual, body)) = message.split_last() else {
        return Err(FrameError::Truncated {
            offset: 0,
            needed: 1,
            available: 0,
        });
    };
    let expected = crc8(body);
    if expected != actual {
        return Err(FrameError::checksum(ChecksumScope::Crc8, expected, actual));
    }
    Ok(())
}

/// Reject a terminal call whose length differs from what was requested.
pub(crate) fn expect_total(message: &[u8], total: usize, name: &str) -> Result<()> {
    if message.len() != total {
        return Err(FrameError::Protocol(format!(
            "{name} message is {} bytes, expected {total}",
            message.len()
        )));
    }
    Ok(())
}

/// Append the CRC-8 of everything written to `response` since `start`.
pub(crate) fn seal(response: &mut ResponseBuffer, start: usize) {
    let crc = crc8(response.since(start));
    response.put_u8(crc);
}
