//! NTCB envelope handler (`@NTC` messages).
//!
//! An envelope is a 16-byte header followed by `payload_len` body bytes. The
//! body is routed to a [`BodyHandler`] by the longest registered ASCII prefix
//! of the payload, and the handler's reply is wrapped in a fresh header with
//! receiver and sender swapped.

mod identity;
mod negotiation;

pub use identity::IdentityBody;
pub use negotiation::NegotiationBody;

use tracing::debug;

use crate::codec::{write_header, EnvelopeHeader, WireCursor, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::handler::PacketHandler;
use crate::response::ResponseBuffer;
use crate::session::SessionState;
use crate::trie::PrefixTrie;
use crate::ENVELOPE_PREFIX;

/// Handler for one kind of NTCB body.
pub trait BodyHandler: Send + Sync {
    /// ASCII prefix this handler is registered under.
    fn identifier(&self) -> &'static str;

    /// Process a complete, checksum-verified body.
    ///
    /// `body` is positioned at the first payload byte; offsets it reports are
    /// absolute within the message. Whatever is written to `response` becomes
    /// the reply payload.
    fn handle(
        &self,
        state: &mut SessionState,
        body: &mut WireCursor<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<()>;
}

/// Top-level handler for `@` messages.
pub struct EnvelopeHandler {
    bodies: PrefixTrie<Box<dyn BodyHandler>>,
}

impl Default for EnvelopeHandler {
    fn default() -> Self {
        Self::standard()
    }
}

impl EnvelopeHandler {
    /// Handler with no body handlers registered.
    pub fn new() -> Self {
        Self {
            bodies: PrefixTrie::new(),
        }
    }

    /// Handler with the identity and FLEX negotiation bodies registered.
    pub fn standard() -> Self {
        Self::new()
            .with_body(IdentityBody)
            .with_body(NegotiationBody)
    }

    /// Register a body handler under its identifier.
    pub fn with_body(mut self, body: impl BodyHandler + 'static) -> Self {
        self.register(Box::new(body));
        self
    }

    pub fn register(&mut self, body: Box<dyn BodyHandler>) {
        let identifier = body.identifier();
        if self.bodies.insert(identifier.as_bytes(), body).is_some() {
            debug!(identifier, "replaced NTCB body handler");
        }
    }

    /// Number of registered body handlers.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn finish(
        &self,
        state: &mut SessionState,
        header: &EnvelopeHeader,
        message: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<()> {
        let payload = &message[HEADER_SIZE..];
        header.verify_body(payload)?;

        let (_, body) = self
            .bodies
            .longest_match(payload)
            .ok_or_else(|| FrameError::UnknownBody(printable_prefix(payload)))?;

        state.receiver_id = header.receiver_id;
        state.sender_id = header.sender_id;

        let start = response.reserve_region(HEADER_SIZE);
        let mut cursor = WireCursor::at(message, HEADER_SIZE);
        body.handle(state, &mut cursor, response)?;

        let (region, reply) = response.region_and_tail(start, HEADER_SIZE);
        write_header(region, header.sender_id, header.receiver_id, reply)?;

        debug!(
            body = body.identifier(),
            sender = header.sender_id,
            reply_len = reply.len(),
            "NTCB body handled"
        );
        Ok(())
    }
}

impl PacketHandler for EnvelopeHandler {
    fn identifier(&self) -> u8 {
        ENVELOPE_PREFIX
    }

    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize> {
        if received.len() < HEADER_SIZE {
            return Ok(HEADER_SIZE - received.len());
        }

        let header = EnvelopeHeader::decode(&received[..HEADER_SIZE])?;
        let total = HEADER_SIZE + header.payload_len as usize;

        if received.len() < total {
            return Ok(total - received.len());
        }
        if received.len() > total {
            return Err(FrameError::Protocol(format!(
                "NTCB message holds {} bytes, header declares {total}",
                received.len()
            )));
        }

        self.finish(state, &header, received, response)?;
        Ok(0)
    }
}

/// Short, printable rendition of a payload's leading bytes for errors.
fn printable_prefix(payload: &[u8]) -> String {
    payload
        .iter()
        .take(8)
        .map(|b| {
            if b.is_ascii_graphic() {
                char::from(*b).to_string()
            } else {
                format!("\\x{b:02X}")
            }
        })
        .collect()
}
