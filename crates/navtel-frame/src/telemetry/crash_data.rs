use tracing::{debug, info};

use super::{expect_total, verify_crc, MessageHandler};
use crate::codec::WireCursor;
use crate::crash::write_data_query;
use crate::error::Result;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

/// Offset of the chunk size field.
const SIZE_OFFSET: usize = 13;

/// Offset of the first data byte.
const DATA_OFFSET: usize = 15;

/// `~D`: one chunk of crash file data, answering a `~G` query.
///
/// ```text
/// ~D │ 2 reserved │ result │ time (4B LE) │ offset (4B LE) │ size (2B LE) │ data │ crc8
/// ```
/// Chunks are matched to the active transfer by crash time only. A chunk
/// with a non-zero result, no active transfer, or a different time is
/// dropped without a reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrashDataHandler;

impl MessageHandler for CrashDataHandler {
    fn identifier(&self) -> u8 {
        b'D'
    }

    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize> {
        match received.len() {
            n if n < DATA_OFFSET => return Ok(DATA_OFFSET - n),
            DATA_OFFSET => {
                let size = WireCursor::at(received, SIZE_OFFSET).u16_le()?;
                return Ok(usize::from(size) + 1);
            }
            _ => {}
        }

        let mut cursor = WireCursor::at(received, 4);
        let result = cursor.u8()?;
        let timestamp = cursor.u32_le()?;
        let offset = cursor.u32_le()?;
        let size = usize::from(cursor.u16_le()?);

        expect_total(received, DATA_OFFSET + size + 1, "~D")?;
        verify_crc(received)?;

        let chunk = cursor.take(size)?;

        let Some(transfer) = state
            .crash_transfer_mut()
            .filter(|transfer| result == 0 && transfer.timestamp() == timestamp)
        else {
            debug!(result, timestamp, offset, size, "crash chunk ignored");
            return Ok(0);
        };

        let progress = transfer.apply_chunk(offset, chunk)?;
        let next = transfer.next_chunk_size();
        debug!(
            offset = progress.offset,
            remaining = progress.remaining,
            "crash chunk stored"
        );

        write_data_query(response, timestamp, progress.offset, next);

        if progress.is_complete() {
            info!(timestamp, size = progress.offset, "crash transfer complete");
            state.complete_crash_transfer();
        }
        Ok(0)
    }
}
