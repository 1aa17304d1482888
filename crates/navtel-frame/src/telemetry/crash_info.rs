use tracing::{info, warn};

use super::{expect_total, verify_crc, MessageHandler};
use crate::codec::WireCursor;
use crate::config::TelemetryConfig;
use crate::crash::{write_data_query, CrashTransfer, MAX_CHUNK};
use crate::error::Result;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

/// Announce flags value meaning "crash file ready for download".
const FLAGS_READY: u8 = 0xFF;

/// Offset of the name length byte.
const NAME_LEN_OFFSET: usize = 13;

/// `~I`: crash file announce.
///
/// ```text
/// ~I │ 2 reserved │ time (4B LE) │ length (4B LE) │ flags │ name len │ name │ crc8
/// ```
/// A ready announce starts a crash transfer and is answered with the first
/// `~G` data query.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrashInfoHandler {
    config: TelemetryConfig,
}

impl CrashInfoHandler {
    pub fn new(config: TelemetryConfig) -> Self {
        Self { config }
    }
}

impl MessageHandler for CrashInfoHandler {
    fn identifier(&self) -> u8 {
        b'I'
    }

    fn pending_bytes(
        &self,
        state: &mut SessionState,
        received: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<usize> {
        match received.len() {
            n if n <= NAME_LEN_OFFSET => return Ok(NAME_LEN_OFFSET + 1 - n),
            14 => return Ok(usize::from(received[NAME_LEN_OFFSET]) + 1),
            _ => {}
        }

        expect_total(
            received,
            NAME_LEN_OFFSET + 2 + usize::from(received[NAME_LEN_OFFSET]),
            "~I",
        )?;
        verify_crc(received)?;

        let mut cursor = WireCursor::at(received, 2);
        cursor.skip(2)?;
        let timestamp = cursor.u32_le()?;
        let length = cursor.u32_le()?;
        let flags = cursor.u8()?;
        let name_len = usize::from(cursor.u8()?);
        let name = String::from_utf8_lossy(cursor.take(name_len)?).into_owned();

        if timestamp == 0 || length == 0 || flags != FLAGS_READY {
            info!(name = %name, timestamp, length, flags, "crash announce not ready");
            return Ok(0);
        }
        if length > self.config.max_crash_size {
            warn!(
                name = %name,
                length,
                max = self.config.max_crash_size,
                "crash file exceeds limit, not requesting it"
            );
            return Ok(0);
        }

        info!(name = %name, timestamp, length, "crash transfer started");
        if let Some(previous) = state.begin_crash_transfer(CrashTransfer::new(name, timestamp, length)) {
            warn!(
                name = previous.name(),
                received = previous.offset(),
                total = previous.total_size(),
                "crash transfer abandoned by new announce"
            );
        }

        write_data_query(response, timestamp, 0, length.min(MAX_CHUNK) as u16);
        Ok(0)
    }
}
