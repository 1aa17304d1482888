//! Server and decoder for the Navtelecom tracker protocols.
//!
//! Trackers connect over TCP and speak two nested protocols: NTCB, a
//! fixed-header envelope used for identification and negotiation, and FLEX,
//! compact telemetry whose record layout is agreed per session. navtel
//! answers both, and pulls crash-recorder files off the device in bounded
//! chunks.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream abstraction
//! - [`frame`]: sans-I/O protocol core (checksums, handlers, dispatch)
//! - [`peer`]: connection driver and listener (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use navtel_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use navtel_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use navtel_peer::*;
}
