//! Checksums used on the wire.
//!
//! NTCB frames carry XOR-folds over the header and payload; FLEX messages end
//! with a CRC-8 (polynomial 0x31, init 0xFF, MSB-first, no reflection, no
//! final XOR) over every preceding byte of the message.

const CRC8_POLY: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;

/// Cumulative XOR of every byte in `bytes`.
pub fn xor_fold(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// CRC-8 over `bytes`.
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(CRC8_INIT, |mut crc, &b| {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
        }
        crc
    })
}
