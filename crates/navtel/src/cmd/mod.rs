use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept tracker connections and answer them.
    Serve(ServeArgs),
    /// Decode a hex capture of tracker traffic offline.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "NAVTEL_BIND", default_value = "0.0.0.0:5221")]
    pub bind: String,
    /// Per-read timeout on tracker connections (e.g. 120s, 500ms).
    #[arg(long)]
    pub read_timeout: Option<String>,
    /// Per-write timeout on tracker connections.
    #[arg(long)]
    pub write_timeout: Option<String>,
    /// Largest message accepted from a tracker, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message_size: Option<usize>,
    /// Largest crash file accepted from a tracker, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_crash_size: Option<u32>,
    /// Never send crash status queries on crash-like events.
    #[arg(long)]
    pub no_crash_trigger: bool,
    /// Write completed crash files into this directory.
    #[arg(long, value_name = "DIR")]
    pub crash_dir: Option<PathBuf>,
    /// Run connections as tasks on a tokio runtime.
    #[cfg(feature = "async")]
    #[arg(long)]
    pub tokio: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded capture; whitespace, ':' and '-' are ignored.
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub hex: Option<String>,
    /// Read the capture from a file.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// The file holds raw bytes rather than hex.
    #[arg(long, requires = "file")]
    pub binary: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }
}
