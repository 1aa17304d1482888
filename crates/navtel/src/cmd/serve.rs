use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use navtel_frame::{CompletedCrash, SessionState};
use navtel_peer::{ConnectionInfo, ServerConfig, SessionObserver, TrackerListener};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_crash, CrashSummary, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;
    if let Some(dir) = &args.crash_dir {
        fs::create_dir_all(dir).map_err(|err| io_error("cannot create crash directory", err))?;
    }
    let observer: Arc<dyn SessionObserver> =
        Arc::new(CliObserver::new(format, args.crash_dir.clone()));

    let listener = TrackerListener::bind_with_config(args.bind.as_str(), config)
        .map_err(|err| peer_error("bind failed", err))?;

    #[cfg(feature = "async")]
    {
        if args.tokio {
            return serve_tokio(listener, observer);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        install_ctrlc_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    listener
        .serve(observer, running)
        .map_err(|err| peer_error("serve failed", err))?;
    Ok(SUCCESS)
}

#[cfg(feature = "async")]
fn serve_tokio(listener: TrackerListener, observer: Arc<dyn SessionObserver>) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    let shutdown = tokio_util::sync::CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        install_ctrlc_handler(move || shutdown.cancel())?;
    }

    runtime
        .block_on(listener.serve_async(observer, shutdown))
        .map_err(|err| peer_error("serve failed", err))?;
    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let mut config = ServerConfig::default();
    if let Some(timeout) = &args.read_timeout {
        config.stream.read_timeout = Some(parse_duration(timeout)?);
    }
    if let Some(timeout) = &args.write_timeout {
        config.stream.write_timeout = Some(parse_duration(timeout)?);
    }
    if let Some(max) = args.max_message_size {
        config.stream.max_message_size = max;
    }
    if let Some(max) = args.max_crash_size {
        config.telemetry.max_crash_size = max;
    }
    config.crash_trigger = !args.no_crash_trigger;
    Ok(config)
}

fn install_ctrlc_handler(on_signal: impl FnMut() + Send + 'static) -> CliResult<()> {
    ctrlc::set_handler(on_signal)
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Logs connections, saves crash files and prints a line per crash.
struct CliObserver {
    format: OutputFormat,
    crash_dir: Option<PathBuf>,
}

impl CliObserver {
    fn new(format: OutputFormat, crash_dir: Option<PathBuf>) -> Self {
        Self { format, crash_dir }
    }
}

impl SessionObserver for CliObserver {
    fn connection_opened(&self, info: &ConnectionInfo) {
        match info.peer_addr {
            Some(peer) => info!(conn = %info.id, %peer, "tracker connected"),
            None => info!(conn = %info.id, "tracker connected"),
        }
    }

    fn crash_transfer_complete(
        &self,
        info: &ConnectionInfo,
        session: &SessionState,
        crash: &CompletedCrash,
    ) {
        let device = session.device_identifier.as_deref();
        let saved = self.crash_dir.as_deref().and_then(|dir| {
            match save_crash(dir, device, crash) {
                Ok(path) => Some(path.display().to_string()),
                Err(err) => {
                    warn!(
                        conn = %info.id,
                        name = %crash.name,
                        error = %err,
                        "failed to save crash file"
                    );
                    None
                }
            }
        });

        print_crash(
            &CrashSummary {
                conn: &info.id,
                device,
                name: &crash.name,
                timestamp: crash.timestamp,
                size: crash.data.len(),
                path: saved.as_deref(),
            },
            self.format,
        );
    }
}

fn save_crash(dir: &Path, device: Option<&str>, crash: &CompletedCrash) -> io::Result<PathBuf> {
    let path = dir.join(crash_file_name(device, crash));
    fs::write(&path, &crash.data)?;
    info!(path = %path.display(), size = crash.data.len(), "crash file saved");
    Ok(path)
}

/// `<device>-<time>-<name>`, with anything outside `[A-Za-z0-9._-]`
/// replaced. Never contains a path separator.
fn crash_file_name(device: Option<&str>, crash: &CompletedCrash) -> String {
    let name = sanitize(&crash.name);
    let name = if name.trim_matches('.').is_empty() {
        "crash.bin".to_string()
    } else {
        name
    };
    format!(
        "{}-{}-{}",
        sanitize(device.unwrap_or("unknown")),
        crash.timestamp,
        name
    )
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn crash(name: &str) -> CompletedCrash {
        CompletedCrash {
            name: name.to_string(),
            timestamp: 1_700_000_000,
            data: b"dump".to_vec().into(),
        }
    }

    fn args() -> ServeArgs {
        ServeArgs {
            bind: "127.0.0.1:0".into(),
            read_timeout: None,
            write_timeout: None,
            max_message_size: None,
            max_crash_size: None,
            no_crash_trigger: false,
            crash_dir: None,
            #[cfg(feature = "async")]
            tokio: false,
        }
    }

    #[test]
    fn crash_file_names_stay_inside_directory() {
        assert_eq!(
            crash_file_name(Some("868204005647838"), &crash("crash.bin")),
            "868204005647838-1700000000-crash.bin"
        );
        assert_eq!(
            crash_file_name(None, &crash("../../etc/passwd")),
            "unknown-1700000000-.._.._etc_passwd"
        );
        assert_eq!(crash_file_name(None, &crash("..")), "unknown-1700000000-crash.bin");
    }

    #[test]
    fn server_config_from_flags() {
        let mut args = args();
        args.read_timeout = Some("90s".into());
        args.max_crash_size = Some(1024);
        args.no_crash_trigger = true;

        let config = server_config(&args).unwrap();
        assert_eq!(config.stream.read_timeout, Some(Duration::from_secs(90)));
        assert!(config.stream.write_timeout.is_none());
        assert_eq!(config.telemetry.max_crash_size, 1024);
        assert!(!config.crash_trigger);
    }

    #[test]
    fn bad_timeout_is_usage_error() {
        let mut args = args();
        args.write_timeout = Some("later".into());
        let err = server_config(&args).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn save_crash_writes_file() {
        let dir = std::env::temp_dir().join(format!("navtel-save-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let path = save_crash(&dir, Some("356307042441013"), &crash("a b.bin")).unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "356307042441013-1700000000-a_b.bin"
        );
        assert_eq!(fs::read(&path).unwrap(), b"dump");

        let _ = fs::remove_dir_all(&dir);
    }
}
