//! Crash-recorder file transfer.
//!
//! A device announces a crash file (`~I`), the server pulls it in chunks of
//! at most 65535 bytes with `~G` queries, and the device answers each query
//! with a `~D` chunk. Announce and chunks are correlated by the crash
//! timestamp only; there is no transfer identifier on the wire.

use bytes::Bytes;

use crate::checksum::crc8;
use crate::error::{FrameError, Result};
use crate::response::ResponseBuffer;

/// Query (`~Q`) for crash status, sent unsolicited when a crash event is seen.
pub const CRASH_STATUS_QUERY: [u8; 5] = [0x7E, 0x51, 0x7B, 0x00, 0x5B];

/// Prefix of a query (`~G`) for crash binary data.
pub const CRASH_DATA_QUERY_PREFIX: [u8; 4] = [0x7E, 0x47, 0x7B, 0x00];

/// Largest chunk a single data query may request.
pub const MAX_CHUNK: u32 = u16::MAX as u32;

/// An in-progress device-to-server crash file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashTransfer {
    name: String,
    timestamp: u32,
    data: Vec<u8>,
    offset: u32,
}

/// Result of applying a chunk to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Offset after the chunk.
    pub offset: u32,
    /// Bytes still to be received.
    pub remaining: u32,
}

impl ChunkProgress {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

impl CrashTransfer {
    /// Start a transfer of `total_size` bytes, zero-filled until received.
    pub fn new(name: impl Into<String>, timestamp: u32, total_size: u32) -> Self {
        Self {
            name: name.into(),
            timestamp,
            data: vec![0u8; total_size as usize],
            offset: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Crash time in UNIX seconds; correlates announce and chunks.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn total_size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Bytes received so far.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn remaining(&self) -> u32 {
        self.total_size() - self.offset
    }

    /// Copy `chunk` to `[offset, offset + len)` and move the transfer offset
    /// past it.
    pub fn apply_chunk(&mut self, offset: u32, chunk: &[u8]) -> Result<ChunkProgress> {
        let start = offset as usize;
        let end = start
            .checked_add(chunk.len())
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                FrameError::Protocol(format!(
                    "crash chunk [{start}, {}) exceeds file size {}",
                    start.saturating_add(chunk.len()),
                    self.data.len()
                ))
            })?;

        self.data[start..end].copy_from_slice(chunk);
        self.offset = end as u32;

        Ok(ChunkProgress {
            offset: self.offset,
            remaining: self.remaining(),
        })
    }

    /// Size of the next chunk to request.
    pub fn next_chunk_size(&self) -> u16 {
        self.remaining().min(MAX_CHUNK) as u16
    }

    /// Finish the transfer, handing over the assembled file.
    pub fn into_completed(self) -> CompletedCrash {
        CompletedCrash {
            name: self.name,
            timestamp: self.timestamp,
            data: Bytes::from(self.data),
        }
    }
}

/// A fully received crash file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCrash {
    /// File name announced by the device.
    pub name: String,
    /// Crash time in UNIX seconds.
    pub timestamp: u32,
    /// Assembled file contents.
    pub data: Bytes,
}

/// Write a `~G` crash data query followed by its CRC-8.
///
/// ```text
/// 7E 47 7B 00 │ time (4B LE) │ offset (4B LE) │ size (2B LE) │ crc8
/// ```
pub fn write_data_query(out: &mut ResponseBuffer, timestamp: u32, offset: u32, size: u16) {
    let start = out.len();
    out.put_slice(&CRASH_DATA_QUERY_PREFIX);
    out.put_u32_le(timestamp);
    out.put_u32_le(offset);
    out.put_u16_le(size);
    let crc = crc8(out.since(start));
    out.put_u8(crc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_assemble_file_in_order() {
        let mut transfer = CrashTransfer::new("raif.bin", 1_700_000_000, 10);
        assert_eq!(transfer.remaining(), 10);

        let first = transfer.apply_chunk(0, b"01234").unwrap();
        assert_eq!(first.offset, 5);
        assert!(!first.is_complete());

        let second = transfer.apply_chunk(5, b"56789").unwrap();
        assert!(second.is_complete());

        let done = transfer.into_completed();
        assert_eq!(done.name, "raif.bin");
        assert_eq!(done.timestamp, 1_700_000_000);
        assert_eq!(done.data.as_ref(), b"0123456789");
    }

    #[test]
    fn chunk_past_end_is_rejected() {
        let mut transfer = CrashTransfer::new("x", 1, 4);
        let err = transfer.apply_chunk(2, b"abc").unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
        assert_eq!(transfer.offset(), 0);

        let err = transfer.apply_chunk(u32::MAX, b"a").unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
    }

    #[test]
    fn next_chunk_is_capped() {
        let transfer = CrashTransfer::new("big", 1, 200_000);
        assert_eq!(transfer.next_chunk_size(), u16::MAX);

        let mut transfer = CrashTransfer::new("small", 1, 70_000);
        transfer.apply_chunk(0, &vec![0u8; 65_535]).unwrap();
        assert_eq!(transfer.next_chunk_size(), 4_465);
    }

    #[test]
    fn data_query_layout() {
        let mut out = ResponseBuffer::new();
        write_data_query(&mut out, 0x6553_F100, 5, 5);
        let bytes = out.as_slice();

        assert_eq!(bytes.len(), 15);
        assert_eq!(&bytes[..4], &CRASH_DATA_QUERY_PREFIX);
        assert_eq!(&bytes[4..8], &0x6553_F100u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &5u32.to_le_bytes());
        assert_eq!(&bytes[12..14], &5u16.to_le_bytes());
        assert_eq!(bytes[14], crc8(&bytes[..14]));
    }
}
