//! FLEX telemetry field layout.
//!
//! A FLEX record is the concatenation of the fields selected by the session's
//! field mask, in table order. Field `i` always occupies `FIELD_WIDTHS[i]`
//! bytes, so the record size is fully determined by the mask.

use crate::error::{FrameError, Result};

/// Number of fields defined by the FLEX structure table.
pub const FIELD_COUNT: usize = 122;

/// Byte width of every FLEX field, indexed by field number.
#[rustfmt::skip]
pub const FIELD_WIDTHS: [usize; FIELD_COUNT] = [
    // FLEX 1.0
    4, 2, 4, 1, 1, 1, 1, 1, 4, 4,
    4, 4, 4, 2, 4, 4, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 1, 1,
    1, 1, 4, 4, 2, 2, 4, 2, 2, 2,
    2, 2, 2, 2, 1, 1, 1, 1, 1, 1,
    1, 1, 2, 4, 2, 1, 4, 2, 2, 2,
    2, 2, 1, 1, 1, 2, 4, 2, 1,
    // extended fields
    8, 2, 1, 16, 4, 2, 4, 37, 1, 1,
    1, 1, 1, 1, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 6, 12, 24, 48, 1, 1,
    1, 1, 4, 4, 1, 4, 2, 6, 2, 6,
    2, 2, 2, 2, 2, 2, 2, 2, 1, 2,
    2, 2, 1,
];

/// Size in bytes of one record for the given mask.
///
/// Bits beyond the end of the table never contribute; [`FieldMask`] rejects
/// such masks at negotiation time.
pub fn record_size(mask: &[bool]) -> usize {
    mask.iter()
        .zip(FIELD_WIDTHS.iter())
        .filter(|(set, _)| **set)
        .map(|(_, width)| width)
        .sum()
}

/// Number of bytes needed to carry `bits` mask bits.
pub fn mask_byte_count(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Per-session selection of the FLEX fields present in every record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMask {
    bits: Vec<bool>,
}

impl FieldMask {
    /// Build a mask from explicit bits.
    pub fn new(bits: Vec<bool>) -> Result<Self> {
        if bits.len() > FIELD_COUNT {
            return Err(FrameError::Protocol(format!(
                "field mask has {} bits, table defines {FIELD_COUNT}",
                bits.len()
            )));
        }
        Ok(Self { bits })
    }

    /// Expand `count` bits from wire bytes, MSB first within each byte.
    pub fn from_wire(count: usize, bytes: &[u8]) -> Result<Self> {
        let needed = mask_byte_count(count);
        if bytes.len() < needed {
            return Err(FrameError::Truncated {
                offset: 0,
                needed,
                available: bytes.len(),
            });
        }

        let bits = (0..count)
            .map(|i| bytes[i >> 3] & (1 << (7 - (i & 7))) != 0)
            .collect();
        Self::new(bits)
    }

    /// Pack the mask back into wire bytes, MSB first.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = vec![0u8; mask_byte_count(self.bits.len())];
        for (i, _) in self.bits.iter().enumerate().filter(|(_, set)| **set) {
            out[i >> 3] |= 1 << (7 - (i & 7));
        }
        out
    }

    /// Size in bytes of one record carrying the selected fields.
    pub fn record_size(&self) -> usize {
        record_size(&self.bits)
    }

    /// Whether field `index` is present.
    pub fn is_set(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    /// Number of negotiated fields.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of fields present in each record.
    pub fn count_set(&self) -> usize {
        self.bits.iter().filter(|set| **set).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }
}
