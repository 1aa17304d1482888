use tracing::info;

use super::BodyHandler;
use crate::codec::WireCursor;
use crate::error::{FrameError, Result};
use crate::layout::{mask_byte_count, FieldMask};
use crate::response::ResponseBuffer;
use crate::session::SessionState;

const PREFIX: &str = "*>FLEX";
const REPLY_PREFIX: &[u8] = b"*<FLEX";

/// Protocol identifier byte for FLEX.
pub const FLEX_PROTOCOL: u8 = 0xB0;

/// FLEX negotiation: protocol, versions and the field mask for every
/// subsequent telemetry record.
///
/// ```text
/// "*>FLEX" │ 0xB0 │ protocol ver │ struct ver │ n │ ceil(n/8) mask bytes
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiationBody;

impl BodyHandler for NegotiationBody {
    fn identifier(&self) -> &'static str {
        PREFIX
    }

    fn handle(
        &self,
        state: &mut SessionState,
        body: &mut WireCursor<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<()> {
        body.expect_literal(PREFIX, "FLEX negotiation prefix")?;

        let protocol = body.u8()?;
        if protocol != FLEX_PROTOCOL {
            return Err(FrameError::Protocol(format!(
                "unknown NTCB protocol identifier 0x{protocol:02X}"
            )));
        }

        let protocol_version = body.u8()?;
        let struct_version = body.u8()?;
        let field_count = usize::from(body.u8()?);
        let mask_bytes = body.take(mask_byte_count(field_count))?;
        let mask = FieldMask::from_wire(field_count, mask_bytes)?;

        info!(
            protocol_version,
            struct_version,
            fields = mask.count_set(),
            record_size = mask.record_size(),
            "FLEX negotiated"
        );
        state.set_negotiated(protocol_version, struct_version, mask);

        response.put_slice(REPLY_PREFIX);
        response.put_u8(FLEX_PROTOCOL);
        response.put_u8(protocol_version);
        response.put_u8(struct_version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FIELD_COUNT;

    fn negotiate(body: &[u8]) -> (SessionState, Result<ResponseBuffer>) {
        let mut state = SessionState::new();
        let mut response = ResponseBuffer::new();
        let mut cursor = WireCursor::new(body);
        let result = NegotiationBody
            .handle(&mut state, &mut cursor, &mut response)
            .map(|()| response);
        (state, result)
    }

    #[test]
    fn three_field_mask_is_msb_first() {
        let (state, response) = negotiate(b"*>FLEX\xB0\x14\x0A\x03\xA0");
        let response = response.unwrap();

        assert_eq!(
            state.field_mask().unwrap().as_slice(),
            &[true, false, true]
        );
        assert_eq!(state.protocol_version, 0x14);
        assert_eq!(state.struct_version, 0x0A);
        assert_eq!(response.as_slice(), b"*<FLEX\xB0\x14\x0A");
    }

    #[test]
    fn wrong_protocol_byte_is_protocol_error() {
        let (state, response) = negotiate(b"*>FLEX\xB1\x14\x0A\x03\xA0");
        assert!(matches!(response.unwrap_err(), FrameError::Protocol(_)));
        assert!(!state.is_negotiated());
    }

    #[test]
    fn full_table_mask() {
        let mut body = b"*>FLEX\xB0\x14\x0A".to_vec();
        body.push(FIELD_COUNT as u8);
        body.extend(std::iter::repeat_n(0xFF, mask_byte_count(FIELD_COUNT)));

        let (state, response) = negotiate(&body);
        response.unwrap();
        let mask = state.field_mask().unwrap();
        assert_eq!(mask.len(), FIELD_COUNT);
        assert_eq!(mask.count_set(), FIELD_COUNT);
    }

    #[test]
    fn mask_beyond_table_is_rejected() {
        let mut body = b"*>FLEX\xB0\x14\x0A".to_vec();
        body.push((FIELD_COUNT + 1) as u8);
        body.extend(std::iter::repeat_n(0x00, mask_byte_count(FIELD_COUNT + 1)));

        let (state, response) = negotiate(&body);
        assert!(matches!(response.unwrap_err(), FrameError::Protocol(_)));
        assert!(!state.is_negotiated());
    }

    #[test]
    fn missing_mask_bytes_are_truncated() {
        let (_, response) = negotiate(b"*>FLEX\xB0\x14\x0A\x10\xFF");
        assert!(matches!(response.unwrap_err(), FrameError::Truncated { .. }));
    }
}
