use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use navtel_transport::TrackerStream;
use tracing::trace;

use crate::config::StreamConfig;
use crate::dispatch::Dispatcher;
use crate::error::{FrameError, Result};
use crate::handler::PacketHandler;
use crate::response::ResponseBuffer;
use crate::session::SessionState;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Reads complete tracker messages from any `Read` stream.
///
/// Runs the pull loop: reads one byte, picks the handler, then reads exactly
/// as many bytes as the handler asks for until it reports completion.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: StreamConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, StreamConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: StreamConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read and handle the next complete message (blocking).
    ///
    /// On success `response` holds the reply and the raw message is returned.
    /// Returns `Ok(None)` when the peer closes the stream between messages and
    /// `Err(FrameError::ConnectionClosed)` when it closes mid-message.
    pub fn read_message(
        &mut self,
        dispatcher: &Dispatcher,
        state: &mut SessionState,
        response: &mut ResponseBuffer,
    ) -> Result<Option<Bytes>> {
        self.buf.clear();
        response.clear();

        if !self.fill(1)? {
            return Ok(None);
        }
        let handler = dispatcher.handler_for(self.buf[0])?;

        loop {
            let need = next_read(handler, state, &self.buf, response, &self.config)?;
            if need == 0 {
                trace!(len = self.buf.len(), "message complete");
                return Ok(Some(self.buf.split().freeze()));
            }
            if !self.fill(need)? {
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Append exactly `n` bytes. Returns `false` on EOF before the first byte.
    fn fill(&mut self, n: usize) -> Result<bool> {
        let start = self.buf.len();
        self.buf.resize(start + n, 0);

        let mut filled = 0usize;
        while filled < n {
            match self.inner.read(&mut self.buf[start + filled..]) {
                Ok(0) if filled == 0 && start == 0 => {
                    self.buf.truncate(start);
                    return Ok(false);
                }
                Ok(0) => {
                    self.buf.truncate(start + filled);
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(read) => filled += read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buf.truncate(start + filled);
                    return Err(FrameError::Io(err));
                }
            }
        }
        Ok(true)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl MessageReader<TrackerStream> {
    /// Create a message reader for `TrackerStream` and apply the read timeout
    /// from config.
    pub fn with_config_tcp(inner: TrackerStream, config: StreamConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

/// One step of the pull loop, shared by blocking and async readers.
///
/// Returns how many more bytes `handler` needs on top of `received`, or 0
/// once the message is complete. Fails if the message would outgrow
/// `config.max_message_size`.
pub fn next_read(
    handler: &dyn PacketHandler,
    state: &mut SessionState,
    received: &[u8],
    response: &mut ResponseBuffer,
    config: &StreamConfig,
) -> Result<usize> {
    let need = handler.pending_bytes(state, received, response)?;
    let total = received.len().saturating_add(need);
    if need > 0 && total > config.max_message_size {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: config.max_message_size,
        });
    }
    Ok(need)
}

pub(crate) fn transport_to_frame_error(err: navtel_transport::TransportError) -> FrameError {
    match err {
        navtel_transport::TransportError::Io(io) | navtel_transport::TransportError::Accept(io) => {
            FrameError::Io(io)
        }
        navtel_transport::TransportError::Bind { source, .. }
        | navtel_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
