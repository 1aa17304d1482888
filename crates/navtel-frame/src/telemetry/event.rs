use tracing::debug;

use super::{expect_total, seal, verify_crc, MessageHandler};
use crate::codec::WireCursor;
use crate::error::Result;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

const ACK: &[u8] = b"~T";

/// `~T`: a single telemetry event.
///
/// ```text
/// ~T │ event index (4B LE) │ record │ crc8
/// ```
/// Acknowledged with `~T` + event index + crc8.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventHandler;

impl MessageHandler for EventHandler {
    fn identifier(&self) -> u8 {
        b'T'
    }

    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize> {
        let record_size = state.record_size()?;
        if received.len() == 2 {
            return Ok(record_size + 5);
        }

        expect_total(received, record_size + 7, "~T")?;
        verify_crc(received)?;

        let event_index = WireCursor::at(received, 2).u32_le()?;
        debug!(event_index, "FLEX event received");

        let start = response.len();
        response.put_slice(ACK);
        response.put_u32_le(event_index);
        seal(response, start);
        Ok(0)
    }
}
