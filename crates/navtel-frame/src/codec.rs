use bytes::{Buf, BufMut, BytesMut};

use crate::checksum::xor_fold;
use crate::error::{ChecksumScope, FrameError, Result};

/// NTCB header: preamble (4) + receiver (4) + sender (4) + length (2) +
/// body checksum (1) + header checksum (1) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// NTCB preamble: "@NTC".
pub const PREAMBLE: [u8; 4] = *b"@NTC";

/// Offset of the payload XOR-fold inside the header.
pub const BODY_CHECKSUM_OFFSET: usize = 14;

/// Offset of the header XOR-fold inside the header.
pub const HEADER_CHECKSUM_OFFSET: usize = 15;

/// A decoded NTCB envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Addressee of the message (the server, for device traffic).
    pub receiver_id: u32,
    /// Originator of the message (the device, for device traffic).
    pub sender_id: u32,
    /// Number of payload bytes following the header.
    pub payload_len: u16,
    /// XOR-fold of the payload.
    pub body_checksum: u8,
}

impl EnvelopeHeader {
    /// Decode and verify a 16-byte header.
    ///
    /// Wire format:
    /// ```text
    /// ┌──────────┬───────────┬───────────┬──────────┬───────┬───────┐
    /// │ "@NTC"   │ Receiver  │ Sender    │ Length   │ CSd   │ CSp   │
    /// │ (4B)     │ (4B LE)   │ (4B LE)   │ (2B LE)  │ (1B)  │ (1B)  │
    /// └──────────┴───────────┴───────────┴──────────┴───────┴───────┘
    /// ```
    /// CSd is the XOR-fold of the payload, CSp the XOR-fold of bytes 0..15.
    pub fn decode(header: &[u8]) -> Result<Self> {
        if header.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                offset: 0,
                needed: HEADER_SIZE,
                available: header.len(),
            });
        }

        if header[..PREAMBLE.len()] != PREAMBLE {
            return Err(FrameError::InvalidPreamble {
                context: "NTCB header preamble",
                expected: "@NTC",
            });
        }

        let expected = xor_fold(&header[..HEADER_CHECKSUM_OFFSET]);
        let actual = header[HEADER_CHECKSUM_OFFSET];
        if expected != actual {
            return Err(FrameError::checksum(ChecksumScope::Header, expected, actual));
        }

        let mut cursor = &header[PREAMBLE.len()..HEADER_SIZE];
        let receiver_id = cursor.get_u32_le();
        let sender_id = cursor.get_u32_le();
        let payload_len = cursor.get_u16_le();
        let body_checksum = cursor.get_u8();

        Ok(Self {
            receiver_id,
            sender_id,
            payload_len,
            body_checksum,
        })
    }

    /// Verify the payload against the body checksum carried in this header.
    pub fn verify_body(&self, payload: &[u8]) -> Result<()> {
        let actual = xor_fold(payload);
        if actual != self.body_checksum {
            return Err(FrameError::checksum(
                ChecksumScope::Body,
                self.body_checksum,
                actual,
            ));
        }
        Ok(())
    }
}

/// Write a complete header for `payload` into `dst[..HEADER_SIZE]`.
///
/// `dst` must already hold at least `HEADER_SIZE` bytes; the payload itself
/// is not copied.
pub fn write_header(dst: &mut [u8], receiver_id: u32, sender_id: u32, payload: &[u8]) -> Result<()> {
    let payload_len = u16::try_from(payload.len()).map_err(|_| FrameError::MessageTooLarge {
        size: payload.len(),
        max: u16::MAX as usize,
    })?;
    if dst.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            offset: 0,
            needed: HEADER_SIZE,
            available: dst.len(),
        });
    }

    let mut out = &mut dst[..HEADER_SIZE];
    out.put_slice(&PREAMBLE);
    out.put_u32_le(receiver_id);
    out.put_u32_le(sender_id);
    out.put_u16_le(payload_len);
    out.put_u8(xor_fold(payload));

    let header_checksum = xor_fold(&dst[..HEADER_CHECKSUM_OFFSET]);
    dst[HEADER_CHECKSUM_OFFSET] = header_checksum;
    Ok(())
}

/// Encode a full NTCB message (header + payload).
pub fn encode_envelope(
    receiver_id: u32,
    sender_id: u32,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let start = dst.len();
    dst.resize(start + HEADER_SIZE, 0);
    write_header(&mut dst[start..], receiver_id, sender_id, payload)?;
    dst.put_slice(payload);
    Ok(())
}

/// Bounds-checked little-endian reader over a received message.
///
/// Offsets in errors are absolute positions within the message.
#[derive(Debug, Clone)]
pub struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Cursor positioned at `pos`.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(FrameError::Truncated {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?.get_u8())
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        Ok(self.take(2)?.get_u16_le())
    }

    pub fn u16_be(&mut self) -> Result<u16> {
        Ok(self.take(2)?.get_u16())
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        Ok(self.take(4)?.get_u32_le())
    }

    /// Consume `expected` or fail with a preamble error naming `context`.
    pub fn expect_literal(&mut self, expected: &'static str, context: &'static str) -> Result<()> {
        let bytes = self.take(expected.len()).map_err(|_| FrameError::InvalidPreamble {
            context,
            expected,
        })?;
        if bytes != expected.as_bytes() {
            return Err(FrameError::InvalidPreamble { context, expected });
        }
        Ok(())
    }
}
