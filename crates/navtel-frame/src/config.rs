use std::time::Duration;

/// Default upper bound for a single message: 1 MiB.
///
/// The largest legitimate messages are FLEX batches (255 records) and crash
/// chunks (up to 65535 data bytes), both far below this.
pub const DEFAULT_MAX_MESSAGE: usize = 1024 * 1024;

/// Default upper bound for an announced crash file: 64 MiB.
pub const DEFAULT_MAX_CRASH_SIZE: u32 = 64 * 1024 * 1024;

/// Configuration for reading and writing messages on a stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum accumulated size of one message in bytes. Default: 1 MiB.
    pub max_message_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Configuration for the FLEX telemetry handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Largest crash file accepted from an announce. Larger announces are
    /// ignored as if their flags were not set.
    pub max_crash_size: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_crash_size: DEFAULT_MAX_CRASH_SIZE,
        }
    }
}
