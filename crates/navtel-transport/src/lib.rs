//! TCP transport abstraction for tracker connections.
//!
//! Trackers dial the server over plain TCP. This is the lowest layer of
//! navtel: it owns sockets, timeouts and addresses and knows nothing about
//! the wire protocol. Everything else builds on top of the
//! [`TrackerStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::TrackerStream;
pub use tcp::TcpServerSocket;
