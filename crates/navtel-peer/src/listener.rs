use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use navtel_frame::Dispatcher;
use navtel_transport::{TcpServerSocket, TrackerStream, TransportError};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::observer::SessionObserver;

/// How long `serve` sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Listens for and accepts tracker connections.
pub struct TrackerListener {
    socket: TcpServerSocket,
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    next_conn_id: AtomicU64,
}

impl TrackerListener {
    /// Bind to a TCP address with default configuration.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        Self::bind_with_config(addr, ServerConfig::default())
    }

    /// Bind to a TCP address with explicit configuration.
    pub fn bind_with_config(
        addr: impl ToSocketAddrs + std::fmt::Display,
        config: ServerConfig,
    ) -> Result<Self> {
        let socket = TcpServerSocket::bind(addr)?;
        let dispatcher = Arc::new(Dispatcher::standard(config.telemetry));
        Ok(Self {
            socket,
            dispatcher,
            config,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Override the dispatch table shared by accepted connections.
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Accept the next connection and assign an auto-generated id.
    pub fn accept(&self) -> Result<Connection<TrackerStream, TrackerStream>> {
        let stream = self.socket.accept()?;
        self.wrap(stream)
    }

    /// Accept the next connection and use an explicit id.
    pub fn accept_with_id(&self, id: &str) -> Result<Connection<TrackerStream, TrackerStream>> {
        let stream = self.socket.accept()?;
        Connection::from_tcp(id, stream, Arc::clone(&self.dispatcher), &self.config)
    }

    fn wrap(&self, stream: TrackerStream) -> Result<Connection<TrackerStream, TrackerStream>> {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        Connection::from_tcp(
            format!("conn-{id}"),
            stream,
            Arc::clone(&self.dispatcher),
            &self.config,
        )
    }

    /// Accept connections until `running` is cleared, handling each on its
    /// own thread.
    ///
    /// Connections already accepted keep running after this returns and end
    /// when their tracker disconnects or times out.
    pub fn serve(
        &self,
        observer: Arc<dyn SessionObserver>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        self.socket.set_nonblocking(true)?;
        info!(addr = %self.local_addr(), "serving tracker connections");

        while running.load(Ordering::SeqCst) {
            let stream = match self.socket.accept() {
                Ok(stream) => stream,
                Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
                Err(TransportError::Accept(err)) if err.kind() == ErrorKind::Interrupted => {
                    continue;
                }
                Err(TransportError::Accept(err)) => return Err(TransportError::Accept(err).into()),
                Err(err) => {
                    warn!(error = %err, "failed to set up accepted stream");
                    continue;
                }
            };

            let connection = match self.wrap(stream) {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(error = %err, "failed to configure connection");
                    continue;
                }
            };

            let observer = Arc::clone(&observer);
            let name = connection.id().to_string();
            debug!(conn = %name, "spawning connection worker");
            thread::Builder::new()
                .name(name)
                .spawn(move || {
                    // outcome is logged and reported to the observer by run()
                    let _ = connection.run(observer.as_ref());
                })
                .map_err(PeerError::Spawn)?;
        }

        info!("listener stopped");
        Ok(())
    }

    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Split into the raw socket and shared state, for the async driver.
    #[cfg(feature = "async")]
    pub(crate) fn into_parts(self) -> (TcpServerSocket, Arc<Dispatcher>, ServerConfig) {
        (self.socket, self.dispatcher, self.config)
    }
}
