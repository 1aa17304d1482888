//! Tokio connection driver.
//!
//! Same pull step and post-message handling as
//! [`Connection`](crate::Connection), over any `AsyncRead + AsyncWrite`
//! stream. Timeouts from [`StreamConfig`] are applied per read and per
//! write.

use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use navtel_frame::{
    next_read, Dispatcher, FrameError, ResponseBuffer, SessionState, StreamConfig,
    CRASH_STATUS_QUERY,
};
use navtel_transport::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{complete_message, record_crash_query, report_close};
use crate::error::Result;
use crate::listener::TrackerListener;
use crate::observer::{ConnectionInfo, ConnectionStats, SessionObserver};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Drive one tracker connection until the peer disconnects or an error
/// occurs. Notifies `observer` as the blocking driver does.
pub async fn run_connection_async<S>(
    info: ConnectionInfo,
    stream: S,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    observer: &dyn SessionObserver,
) -> Result<ConnectionStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    observer.connection_opened(&info);

    let mut conn = AsyncConnection {
        stream,
        buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        dispatcher,
        state: SessionState::new(),
        response: ResponseBuffer::new(),
        stream_config: config.stream,
        crash_trigger: config.crash_trigger,
        stats: ConnectionStats::default(),
    };

    let outcome = loop {
        match conn.process_next(&info, observer).await {
            Ok(true) => continue,
            Ok(false) => break Ok(()),
            Err(err) => break Err(err.into()),
        }
    };

    report_close(&info, &conn.stats, outcome.as_ref().err(), observer);
    outcome.map(|()| conn.stats)
}

/// Accept connections from a tokio listener until `shutdown` is cancelled,
/// running each on its own task.
///
/// Cancelling also stops in-flight connections; their observers are not
/// told about the close.
pub async fn serve_async(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    observer: Arc<dyn SessionObserver>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut next_conn_id: u64 = 1;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "serving tracker connections");
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted.map_err(TransportError::Accept)?,
        };

        if let Err(err) = stream.set_nodelay(config.nodelay) {
            warn!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
        }

        let info = ConnectionInfo::new(format!("conn-{next_conn_id}"), Some(peer));
        next_conn_id += 1;
        debug!(conn = %info.id, peer = %peer, "accepted connection");

        let dispatcher = Arc::clone(&dispatcher);
        let config = config.clone();
        let observer = Arc::clone(&observer);
        let token = shutdown.child_token();
        tokio::spawn(async move {
            let id = info.id.clone();
            tokio::select! {
                _ = token.cancelled() => debug!(conn = %id, "connection cancelled"),
                _ = run_connection_async(info, stream, dispatcher, config, observer.as_ref()) => {}
            }
        });
    }

    info!("listener stopped");
    Ok(())
}

impl TrackerListener {
    /// Serve on the tokio runtime until `shutdown` is cancelled.
    pub async fn serve_async(
        self,
        observer: Arc<dyn SessionObserver>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (socket, dispatcher, config) = self.into_parts();
        let listener = socket.into_tokio()?;
        serve_async(listener, dispatcher, config, observer, shutdown).await
    }
}

struct AsyncConnection<S> {
    stream: S,
    buf: BytesMut,
    dispatcher: Arc<Dispatcher>,
    state: SessionState,
    response: ResponseBuffer,
    stream_config: StreamConfig,
    crash_trigger: bool,
    stats: ConnectionStats,
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncConnection<S> {
    /// Returns `Ok(false)` once the peer has closed between messages.
    async fn process_next(
        &mut self,
        info: &ConnectionInfo,
        observer: &dyn SessionObserver,
    ) -> std::result::Result<bool, FrameError> {
        let Some(message) = self.read_message().await? else {
            return Ok(false);
        };

        if !self.response.is_empty() {
            let limit = self.stream_config.write_timeout;
            write_all(&mut self.stream, self.response.as_slice(), limit).await?;
            self.response.clear();
        }
        let query_due = complete_message(
            info,
            &mut self.state,
            &mut self.stats,
            observer,
            &message,
            self.crash_trigger,
        );
        if query_due {
            let limit = self.stream_config.write_timeout;
            let sent = write_all(&mut self.stream, &CRASH_STATUS_QUERY, limit).await;
            record_crash_query(info, &mut self.stats, sent);
        }

        Ok(true)
    }

    async fn read_message(&mut self) -> std::result::Result<Option<Bytes>, FrameError> {
        self.buf.clear();
        self.response.clear();

        if !self.fill(1).await? {
            return Ok(None);
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let handler = dispatcher.handler_for(self.buf[0])?;

        loop {
            let need = next_read(
                handler,
                &mut self.state,
                &self.buf,
                &mut self.response,
                &self.stream_config,
            )?;
            if need == 0 {
                return Ok(Some(self.buf.split().freeze()));
            }
            if !self.fill(need).await? {
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Append exactly `n` bytes. Returns `false` on EOF before the first byte
    /// of a message.
    async fn fill(&mut self, n: usize) -> std::result::Result<bool, FrameError> {
        let start = self.buf.len();
        self.buf.resize(start + n, 0);
        let limit = self.stream_config.read_timeout;

        let mut filled = 0usize;
        while filled < n {
            let read = with_timeout(limit, self.stream.read(&mut self.buf[start + filled..])).await;
            match read {
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
}

async fn write_all<S: AsyncWrite + Unpin>(
    stream: &mut S,
    bytes: &[u8],
    limit: Option<Duration>,
) -> std::result::Result<(), FrameError> {
    with_timeout(limit, async {
        stream.write_all(bytes).await?;
        stream.flush().await
    })
    .await
    .map_err(|err| match err.kind() {
        ErrorKind::WriteZero => FrameError::ConnectionClosed,
        _ => FrameError::Io(err),
    })
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = std::io::Result<T>>,
) -> std::io::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| std::io::Error::from(ErrorKind::TimedOut))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use navtel_frame::codec::encode_envelope;

    use super::*;
    use crate::observer::NoopObserver;
    use crate::PeerError;

    fn envelope(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_envelope(1, 7, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[derive(Default)]
    struct Closed(Mutex<Vec<bool>>);

    impl SessionObserver for Closed {
        fn connection_closed(
            &self,
            _info: &ConnectionInfo,
            _stats: &ConnectionStats,
            error: Option<&PeerError>,
        ) {
            self.0.lock().unwrap().push(error.is_some());
        }
    }

    #[tokio::test]
    async fn negotiation_then_ping_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(async move {
            run_connection_async(
                ConnectionInfo::new("conn-1", None),
                server,
                Arc::new(Dispatcher::default()),
                ServerConfig::default(),
                &NoopObserver,
            )
            .await
        });

        client
            .write_all(&envelope(b"*>FLEX\xB0\x14\x0A\x03\xA0"))
            .await
            .unwrap();
        client.write_all(&[0x7F]).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(&reply[16..25], b"*<FLEX\xB0\x14\x0A");
        assert_eq!(&reply[25..], &CRASH_STATUS_QUERY);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.crash_queries, 1);
    }

    #[tokio::test]
    async fn stalled_message_times_out() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut config = ServerConfig::default();
        config.stream.read_timeout = Some(Duration::from_millis(50));
        let observer = Closed::default();

        client.write_all(b"~").await.unwrap();
        let err = run_connection_async(
            ConnectionInfo::new("conn-1", None),
            server,
            Arc::new(Dispatcher::default()),
            config,
            &observer,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PeerError::Frame(FrameError::Io(ref e)) if e.kind() == ErrorKind::TimedOut
        ));
        assert_eq!(*observer.0.lock().unwrap(), vec![true]);
        drop(client);
    }

    #[tokio::test]
    async fn serve_async_stops_on_cancel() {
        let listener = TrackerListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(
            listener.serve_async(Arc::new(NoopObserver), shutdown.clone()),
        );

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&envelope(b"*>S:868204005647838"))
            .await
            .unwrap();
        let mut reply = [0u8; 19];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..4], b"@NTC");
        assert_eq!(&reply[16..], b"*<S");

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
