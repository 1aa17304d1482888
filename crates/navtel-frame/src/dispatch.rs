use bytes::Bytes;

use crate::config::TelemetryConfig;
use crate::envelope::EnvelopeHandler;
use crate::error::{FrameError, Result};
use crate::handler::PacketHandler;
use crate::ping::PingHandler;
use crate::response::ResponseBuffer;
use crate::session::SessionState;
use crate::telemetry::TelemetryHandler;

/// One message decoded from an in-memory buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Number of input bytes the message occupied.
    pub len: usize,
    /// Bytes to send back to the device; may be empty.
    pub response: Bytes,
}

/// Routes each message to a handler by its first byte.
///
/// The table is built once and only read afterwards, so a single
/// `Dispatcher` can be shared by every connection (for example behind an
/// `Arc`).
pub struct Dispatcher {
    handlers: [Option<Box<dyn PacketHandler>>; 256],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::standard(TelemetryConfig::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<String> = self
            .registered()
            .map(|prefix| format!("0x{prefix:02X}"))
            .collect();
        f.debug_struct("Dispatcher")
            .field("prefixes", &prefixes)
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher with an empty table.
    pub fn new() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// Dispatcher with the envelope, telemetry and ping handlers.
    pub fn standard(telemetry: TelemetryConfig) -> Self {
        Self::new()
            .with_handler(EnvelopeHandler::standard())
            .with_handler(TelemetryHandler::standard(telemetry))
            .with_handler(PingHandler)
    }

    pub fn with_handler(mut self, handler: impl PacketHandler + 'static) -> Self {
        self.register(Box::new(handler));
        self
    }

    /// Register a handler, replacing any handler on the same first byte.
    pub fn register(&mut self, handler: Box<dyn PacketHandler>) {
        let slot = usize::from(handler.identifier());
        self.handlers[slot] = Some(handler);
    }

    /// Handler for a message starting with `prefix`.
    pub fn handler_for(&self, prefix: u8) -> Result<&dyn PacketHandler> {
        self.handlers[usize::from(prefix)]
            .as_deref()
            .ok_or(FrameError::UnknownPrefix(prefix))
    }

    /// First bytes with a registered handler, ascending.
    pub fn registered(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|prefix| self.handlers[usize::from(*prefix)].is_some())
    }

    /// Decode the first message in `input`.
    ///
    /// Returns `Ok(None)` if `input` ends before the message does; the session
    /// is left untouched in that case and the call can be repeated once more
    /// bytes are available.
    pub fn decode(&self, state: &mut SessionState, input: &[u8]) -> Result<Option<Decoded>> {
        let Some(&prefix) = input.first() else {
            return Ok(None);
        };
        let handler = self.handler_for(prefix)?;

        let mut response = ResponseBuffer::new();
        let mut len = 1;
        loop {
            let need = handler.pending_bytes(state, &input[..len], &mut response)?;
            if need == 0 {
                return Ok(Some(Decoded {
                    len,
                    response: response.take(),
                }));
            }
            if input.len() - len < need {
                return Ok(None);
            }
            len += need;
        }
    }

    /// Decode every complete message in `input`, stopping at the first
    /// incomplete one.
    pub fn decode_all(&self, state: &mut SessionState, input: &[u8]) -> Result<Vec<Decoded>> {
        let mut out = Vec::new();
        let mut rest = input;
        while let Some(decoded) = self.decode(state, rest)? {
            rest = &rest[decoded.len..];
            out.push(decoded);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::checksum::crc8;
    use crate::codec::{encode_envelope, EnvelopeHeader, HEADER_SIZE};
    use crate::error::ErrorKind;
    use crate::session::SessionEvent;
    use crate::{ENVELOPE_PREFIX, PING_PREFIX, TELEMETRY_PREFIX};

    fn envelope(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_envelope(1, 0xBEEF, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
        body.push(crc8(&body));
        body
    }

    #[test]
    fn standard_table() {
        let dispatcher = Dispatcher::default();
        let registered: Vec<u8> = dispatcher.registered().collect();
        assert_eq!(registered, vec![ENVELOPE_PREFIX, TELEMETRY_PREFIX, PING_PREFIX]);
    }

    #[test]
    fn unknown_prefix_fails_on_first_byte() {
        let dispatcher = Dispatcher::default();
        let mut state = SessionState::new();
        let err = dispatcher.decode(&mut state, &[0x00]).unwrap_err();
        assert!(matches!(err, FrameError::UnknownPrefix(0x00)));
        assert_eq!(err.kind(), ErrorKind::Framing);
    }

    #[test]
    fn incomplete_input_needs_more() {
        let dispatcher = Dispatcher::default();
        let mut state = SessionState::new();
        let message = envelope(b"*>S:868204005647838");

        assert_eq!(dispatcher.decode(&mut state, &[]).unwrap(), None);
        assert_eq!(dispatcher.decode(&mut state, &message[..10]).unwrap(), None);
        assert_eq!(
            dispatcher
                .decode(&mut state, &message[..message.len() - 1])
                .unwrap(),
            None
        );
        assert!(state.device_identifier.is_none());

        let decoded = dispatcher.decode(&mut state, &message).unwrap().unwrap();
        assert_eq!(decoded.len, message.len());
        assert!(state.device_identifier.is_some());
    }

    #[test]
    fn ping_is_one_byte_without_reply() {
        let dispatcher = Dispatcher::default();
        let mut state = SessionState::new();
        let decoded = dispatcher
            .decode(&mut state, &[PING_PREFIX, PING_PREFIX])
            .unwrap()
            .unwrap();
        assert_eq!(decoded.len, 1);
        assert!(decoded.response.is_empty());
    }

    #[test]
    fn negotiated_session_acks_event() {
        let dispatcher = Dispatcher::default();
        let mut state = SessionState::new();

        let mut stream = envelope(b"*>S:868204005647838");
        stream.extend(envelope(b"*>FLEX\xB0\x14\x0A\x03\xA0"));

        let mut event = b"~T".to_vec();
        event.extend_from_slice(&42u32.to_le_bytes());
        event.extend_from_slice(&[0x5A; 8]);
        let event = with_crc(event);
        stream.extend_from_slice(&event);

        let decoded = dispatcher.decode_all(&mut state, &stream).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            state.field_mask().unwrap().as_slice(),
            &[true, false, true]
        );

        let negotiation_reply = &decoded[1].response;
        let header = EnvelopeHeader::decode(&negotiation_reply[..HEADER_SIZE]).unwrap();
        assert_eq!((header.receiver_id, header.sender_id), (0xBEEF, 1));
        assert_eq!(&negotiation_reply[HEADER_SIZE..], b"*<FLEX\xB0\x14\x0A");

        let ack = &decoded[2].response;
        assert_eq!(decoded[2].len, event.len());
        assert_eq!(&ack[..2], b"~T");
        assert_eq!(&ack[2..6], &42u32.to_le_bytes());
        assert_eq!(ack[6], crc8(&ack[..6]));
    }

    #[test]
    fn event_before_negotiation_is_protocol_error() {
        let dispatcher = Dispatcher::default();
        let mut state = SessionState::new();
        let err = dispatcher.decode(&mut state, b"~T\x00\x00").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn crash_transfer_over_dispatcher() {
        let dispatcher = Dispatcher::default();
        let mut state = SessionState::new();
        let time = 1_700_000_123u32;

        let mut announce = b"~I\x00\x00".to_vec();
        announce.extend_from_slice(&time.to_le_bytes());
        announce.extend_from_slice(&10u32.to_le_bytes());
        announce.extend_from_slice(&[0xFF, 4]);
        announce.extend_from_slice(b"raif");
        let announce = with_crc(announce);

        let chunk = |offset: u32, data: &[u8]| {
            let mut body = b"~D\x00\x00\x00".to_vec();
            body.extend_from_slice(&time.to_le_bytes());
            body.extend_from_slice(&offset.to_le_bytes());
            body.extend_from_slice(&(data.len() as u16).to_le_bytes());
            body.extend_from_slice(data);
            with_crc(body)
        };

        let mut stream = announce;
        stream.extend(chunk(0, b"hello"));
        stream.extend(chunk(5, b"world"));

        let decoded = dispatcher.decode_all(&mut state, &stream).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(decoded.iter().all(|d| d.response.len() == 15));
        assert!(state.crash_transfer().is_none());

        let events = state.take_events();
        assert_eq!(events.len(), 1);
        let SessionEvent::CrashTransferComplete(done) = &events[0];
        assert_eq!(done.name, "raif");
        assert_eq!(done.data.as_ref(), b"helloworld");
    }
}
