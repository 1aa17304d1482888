use tracing::debug;

use super::{expect_total, seal, verify_crc, MessageHandler};
use crate::error::Result;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

const ACK: &[u8] = b"~A";

/// `~A`: a batch of `count` telemetry records.
///
/// ```text
/// ~A │ count │ count × record │ crc8
/// ```
/// Acknowledged with `~A` + count + crc8.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchHandler;

impl MessageHandler for BatchHandler {
    fn identifier(&self) -> u8 {
        b'A'
    }

    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize> {
        match received.len() {
            2 => Ok(1),
            3 => {
                let count = usize::from(received[2]);
                Ok(state.record_size()? * count + 1)
            }
            _ => {
                let count = received[2];
                let record_size = state.record_size()?;
                expect_total(received, 4 + record_size * usize::from(count), "~A")?;
                verify_crc(received)?;

                debug!(count, record_size, "FLEX batch received");

                let start = response.len();
                response.put_slice(ACK);
                response.put_u8(count);
                seal(response, start);
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, FrameError};
    use crate::layout::FieldMask;
    use crate::telemetry::test_support::{drive, with_crc};

    fn negotiated(bits: Vec<bool>) -> SessionState {
        let mut state = SessionState::new();
        state.set_negotiated(0x14, 0x0A, FieldMask::new(bits).unwrap());
        state
    }

    #[test]
    fn acks_two_records() {
        // record size 8
        let mut state = negotiated(vec![true, false, true]);
        let mut body = b"~A\x02".to_vec();
        body.extend_from_slice(&[0x11; 16]);
        let message = with_crc(body);

        let response = drive(&BatchHandler, &mut state, &message).unwrap();
        assert_eq!(response.as_slice(), &[b'~', b'A', 0x02, 0x8C]);
    }

    #[test]
    fn count_phase_requests_all_records_and_crc() {
        let mut state = negotiated(vec![true, false, true]);
        let mut response = ResponseBuffer::new();
        let need = BatchHandler
            .pending_bytes(&mut state, b"~A\x03", &mut response)
            .unwrap();
        assert_eq!(need, 8 * 3 + 1);
        assert!(response.is_empty());
    }

    #[test]
    fn bad_crc_gets_no_ack() {
        let mut state = negotiated(vec![true]);
        let mut message = with_crc(b"~A\x01\x00\x00\x00\x00".to_vec());
        let last = message.len() - 1;
        message[last] ^= 0xFF;

        let err = drive(&BatchHandler, &mut state, &message).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Checksum);
    }

    #[test]
    fn requires_negotiation() {
        let mut state = SessionState::new();
        let mut response = ResponseBuffer::new();
        let err = BatchHandler
            .pending_bytes(&mut state, b"~A\x01", &mut response)
            .unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
    }
}
