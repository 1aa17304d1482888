use bytes::{BufMut, Bytes, BytesMut};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Growable send buffer filled by handlers while a message is decoded.
///
/// Supports sequential writes plus reserving a region up front and
/// backfilling it once its contents are known (NTCB headers).
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    buf: BytesMut,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Drop any buffered bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes written since `start`.
    pub fn since(&self, start: usize) -> &[u8] {
        &self.buf[start.min(self.buf.len())..]
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16_le(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_u32_le(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Append `len` zero bytes and return the offset where they start.
    pub fn reserve_region(&mut self, len: usize) -> usize {
        let start = self.buf.len();
        self.buf.resize(start + len, 0);
        start
    }

    /// Split a previously written region from everything after it.
    ///
    /// Returns `(region, tail)` where `region` is `[start, start + len)` and
    /// `tail` is everything written after it.
    pub fn region_and_tail(&mut self, start: usize, len: usize) -> (&mut [u8], &[u8]) {
        let (head, tail) = self.buf.split_at_mut(start + len);
        (&mut head[start..], tail)
    }

    /// Take the buffered bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
