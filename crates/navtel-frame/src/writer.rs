use std::io::{ErrorKind, Write};

use navtel_transport::TrackerStream;

use crate::config::StreamConfig;
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;
use crate::response::ResponseBuffer;

/// Writes responses and queries to any `Write` stream.
pub struct ResponseWriter<T> {
    inner: T,
    config: StreamConfig,
}

impl<T: Write> ResponseWriter<T> {
    /// Create a new response writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, StreamConfig::default())
    }

    /// Create a new response writer with explicit configuration.
    pub fn with_config(inner: T, config: StreamConfig) -> Self {
        Self { inner, config }
    }

    /// Send the buffered response and clear it. Empty responses send nothing.
    pub fn flush_response(&mut self, response: &mut ResponseBuffer) -> Result<()> {
        if response.is_empty() {
            return Ok(());
        }
        self.send(response.as_slice())?;
        response.clear();
        Ok(())
    }

    /// Write all of `bytes` and flush (blocking).
    ///
    /// A write that times out (`WouldBlock` or `TimedOut`) fails with
    /// `FrameError::Io`; it is never retried.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl ResponseWriter<TrackerStream> {
    /// Create a response writer for `TrackerStream` and apply the write
    /// timeout from config.
    pub fn with_config_tcp(inner: TrackerStream, config: StreamConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
