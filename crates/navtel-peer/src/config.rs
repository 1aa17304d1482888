use navtel_frame::{StreamConfig, TelemetryConfig};

/// Configuration shared by every connection a server accepts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Message size limit and socket timeouts.
    pub stream: StreamConfig,
    /// FLEX handler limits.
    pub telemetry: TelemetryConfig,
    /// Send a crash status query after messages that suggest a crash.
    /// Default: on.
    pub crash_trigger: bool,
    /// Disable Nagle's algorithm on accepted sockets. Default: on.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            telemetry: TelemetryConfig::default(),
            crash_trigger: true,
            nodelay: true,
        }
    }
}
