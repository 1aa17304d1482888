//! Connection handling for Navtelecom trackers.
//!
//! This is the "just works" layer. Bind a [`TrackerListener`], hand it a
//! [`SessionObserver`], and every accepted tracker gets its own
//! [`Connection`] that reads messages, answers them, asks for crash data
//! when the tracker reports an accident and reports completed crash files.
//!
//! With the `async` feature the same loop runs on tokio
//! ([`run_connection_async`], [`serve_async`]).

pub mod config;
pub mod connection;
#[cfg(feature = "async")]
pub mod driver;
pub mod error;
pub mod listener;
pub mod observer;

pub use config::ServerConfig;
pub use connection::Connection;
#[cfg(feature = "async")]
pub use driver::{run_connection_async, serve_async};
pub use error::{PeerError, Result};
pub use listener::TrackerListener;
pub use observer::{ConnectionInfo, ConnectionStats, NoopObserver, SessionObserver};
