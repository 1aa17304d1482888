//! Crash-trigger heuristic.
//!
//! Some devices never announce a crash file on their own. After answering a
//! message the connection driver checks it with [`detect_crash_signal`] and,
//! on a hit, sends [`CRASH_STATUS_QUERY`](crate::CRASH_STATUS_QUERY) to make
//! the device report any pending crash.

use crate::codec::{WireCursor, HEADER_SIZE};
use crate::{ENVELOPE_PREFIX, TELEMETRY_PREFIX};

/// Event code of a crash-recorder event in a FLEX record.
pub const CRASH_EVENT_CODE: u16 = 0xA03B;

const NEGOTIATION_PREFIX: &[u8] = b"*>FLEX";
const EVENT_CODE_OFFSET: usize = 10;
const BATCH_EVENT_CODE_OFFSET: usize = 7;
const MIN_BATCH_RECORD: usize = 6;

/// Whether a completed message should prompt a crash status query.
///
/// Fires on FLEX negotiation, on a `~T` event whose code (big-endian at
/// offset 10) is the crash event, and on a `~A` batch where any record
/// carries that code.
pub fn detect_crash_signal(message: &[u8]) -> bool {
    match message.first() {
        Some(&ENVELOPE_PREFIX) => message
            .get(HEADER_SIZE..HEADER_SIZE + NEGOTIATION_PREFIX.len())
            .is_some_and(|body| body == NEGOTIATION_PREFIX),
        Some(&TELEMETRY_PREFIX) => match message.get(1) {
            Some(b'T') => event_code_at(message, EVENT_CODE_OFFSET),
            Some(b'A') => batch_has_crash_event(message),
            _ => false,
        },
        _ => false,
    }
}

fn event_code_at(message: &[u8], offset: usize) -> bool {
    WireCursor::at(message, offset)
        .u16_be()
        .is_ok_and(|code| code == CRASH_EVENT_CODE)
}

fn batch_has_crash_event(message: &[u8]) -> bool {
    if message.len() < 4 {
        return false;
    }
    let count = usize::from(message[2]);
    if count == 0 {
        return false;
    }
    let record_len = (message.len() - 4) / count;
    if record_len < MIN_BATCH_RECORD {
        return false;
    }

    (0..count).any(|i| event_code_at(message, BATCH_EVENT_CODE_OFFSET + i * record_len))
}
