use std::io::{Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use navtel_frame::{
    detect_crash_signal, Dispatcher, FrameError, MessageReader, ResponseBuffer, ResponseWriter,
    SessionEvent, SessionState, CRASH_STATUS_QUERY,
};
use navtel_transport::TrackerStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{PeerError, Result};
use crate::observer::{ConnectionInfo, ConnectionStats, SessionObserver};

/// One tracker connection: owns the session and drives the message loop.
pub struct Connection<R, W> {
    info: ConnectionInfo,
    reader: MessageReader<R>,
    writer: ResponseWriter<W>,
    dispatcher: Arc<Dispatcher>,
    state: SessionState,
    response: ResponseBuffer,
    crash_trigger: bool,
    stats: ConnectionStats,
}

impl<R: Read, W: Write> Connection<R, W> {
    /// Build a connection from already configured halves.
    pub fn from_parts(
        info: ConnectionInfo,
        reader: MessageReader<R>,
        writer: ResponseWriter<W>,
        dispatcher: Arc<Dispatcher>,
        crash_trigger: bool,
    ) -> Self {
        Self {
            info,
            reader,
            writer,
            dispatcher,
            state: SessionState::new(),
            response: ResponseBuffer::new(),
            crash_trigger,
            stats: ConnectionStats::default(),
        }
    }

    /// Read, answer and report the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream between
    /// messages.
    pub fn process_next(&mut self, observer: &dyn SessionObserver) -> Result<Option<Bytes>> {
        let Some(message) =
            self.reader
                .read_message(&self.dispatcher, &mut self.state, &mut self.response)?
        else {
            return Ok(None);
        };

        self.writer.flush_response(&mut self.response)?;
        let query_due = complete_message(
            &self.info,
            &mut self.state,
            &mut self.stats,
            observer,
            &message,
            self.crash_trigger,
        );
        if query_due {
            // a failed write surfaces on the next read
            let sent = self.writer.send(&CRASH_STATUS_QUERY);
            record_crash_query(&self.info, &mut self.stats, sent);
        }

        Ok(Some(message))
    }

    /// Process messages until the peer disconnects or an error occurs, then
    /// notify `observer` that the connection closed.
    pub fn run(mut self, observer: &dyn SessionObserver) -> Result<ConnectionStats> {
        observer.connection_opened(&self.info);

        let outcome = loop {
            match self.process_next(observer) {
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        report_close(&self.info, &self.stats, outcome.as_ref().err(), observer);
        outcome.map(|()| self.stats)
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Connection id, `conn-N`.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn session(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}

impl Connection<TrackerStream, TrackerStream> {
    /// Wrap an accepted TCP stream, applying timeouts from `config`.
    pub fn from_tcp(
        id: impl Into<String>,
        stream: TrackerStream,
        dispatcher: Arc<Dispatcher>,
        config: &ServerConfig,
    ) -> Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        let info = ConnectionInfo::new(id, Some(stream.peer_addr()));
        let reader_stream = stream.try_clone()?;

        let reader = MessageReader::with_config_tcp(reader_stream, config.stream.clone())?;
        let writer = ResponseWriter::with_config_tcp(stream, config.stream.clone())?;

        Ok(Self::from_parts(
            info,
            reader,
            writer,
            dispatcher,
            config.crash_trigger,
        ))
    }
}

/// Bookkeeping once a message has been answered: stats, observer
/// callbacks and queued session events. Returns whether a crash status
/// query is due.
pub(crate) fn complete_message(
    info: &ConnectionInfo,
    state: &mut SessionState,
    stats: &mut ConnectionStats,
    observer: &dyn SessionObserver,
    message: &[u8],
    crash_trigger: bool,
) -> bool {
    stats.messages += 1;
    stats.bytes_received += message.len() as u64;
    debug!(
        conn = %info.id,
        prefix = format_args!("0x{:02X}", message[0]),
        size = message.len(),
        "message handled"
    );

    observer.message_received(info, state, message);
    for event in state.take_events() {
        match event {
            SessionEvent::CrashTransferComplete(crash) => {
                stats.crash_files += 1;
                info!(
                    conn = %info.id,
                    name = %crash.name,
                    size = crash.data.len(),
                    "crash file received"
                );
                observer.crash_transfer_complete(info, state, &crash);
            }
        }
    }

    crash_trigger && detect_crash_signal(message)
}

/// Crash status queries are best effort: failures are only logged.
pub(crate) fn record_crash_query(
    info: &ConnectionInfo,
    stats: &mut ConnectionStats,
    sent: std::result::Result<(), FrameError>,
) {
    match sent {
        Ok(()) => {
            stats.crash_queries += 1;
            info!(conn = %info.id, "crash status query sent");
        }
        Err(err) => warn!(conn = %info.id, error = %err, "crash status query failed"),
    }
}

pub(crate) fn report_close(
    info: &ConnectionInfo,
    stats: &ConnectionStats,
    error: Option<&PeerError>,
    observer: &dyn SessionObserver,
) {
    match error {
        None => info!(conn = %info.id, messages = stats.messages, "connection closed"),
        Some(err) => warn!(
            conn = %info.id,
            messages = stats.messages,
            error = %err,
            "connection aborted"
        ),
    }
    observer.connection_closed(info, stats, error);
}
