use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use navtel_frame::SessionState;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A crash file received by `serve`.
#[derive(Serialize)]
pub struct CrashSummary<'a> {
    pub conn: &'a str,
    pub device: Option<&'a str>,
    pub name: &'a str,
    pub timestamp: u32,
    pub size: usize,
    pub path: Option<&'a str>,
}

pub fn print_crash(crash: &CrashSummary<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(crash),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONN", "DEVICE", "NAME", "TIME", "SIZE", "PATH"])
                .add_row(vec![
                    crash.conn.to_string(),
                    crash.device.unwrap_or("-").to_string(),
                    crash.name.to_string(),
                    crash.timestamp.to_string(),
                    crash.size.to_string(),
                    crash.path.unwrap_or("-").to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "crash conn={} device={} name={} time={} size={} path={}",
                crash.conn,
                crash.device.unwrap_or("-"),
                crash.name,
                crash.timestamp,
                crash.size,
                crash.path.unwrap_or("-")
            );
        }
        OutputFormat::Raw => {
            if let Some(path) = crash.path {
                println!("{path}");
            }
        }
    }
}

/// One message found by `decode`.
#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub kind: String,
    /// Hex of the bytes the server would send back.
    pub response: String,
    #[serde(skip)]
    pub response_bytes: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct TransferSummary {
    pub name: String,
    pub timestamp: u32,
    pub offset: u32,
    pub total: u32,
}

#[derive(Debug, Serialize)]
pub struct CompletedSummary {
    pub name: String,
    pub timestamp: u32,
    pub size: usize,
}

/// Session state after the last decoded message.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub device: Option<String>,
    pub receiver_id: u32,
    pub sender_id: u32,
    pub negotiated: bool,
    pub protocol_version: u8,
    pub struct_version: u8,
    pub fields: Option<usize>,
    pub record_size: Option<usize>,
    pub crash_transfer: Option<TransferSummary>,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            device: state.device_identifier.clone(),
            receiver_id: state.receiver_id,
            sender_id: state.sender_id,
            negotiated: state.is_negotiated(),
            protocol_version: state.protocol_version,
            struct_version: state.struct_version,
            fields: state.field_mask().map(|mask| mask.count_set()),
            record_size: state.field_mask().map(|mask| mask.record_size()),
            crash_transfer: state.crash_transfer().map(|t| TransferSummary {
                name: t.name().to_string(),
                timestamp: t.timestamp(),
                offset: t.offset(),
                total: t.total_size(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecodeReport {
    pub messages: Vec<MessageRow>,
    pub completed_crashes: Vec<CompletedSummary>,
    /// Bytes left over after the last complete message.
    pub trailing: usize,
    pub session: SessionSummary,
}

pub fn print_decode(report: &DecodeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "OFFSET", "SIZE", "KIND", "RESPONSE"]);
            for row in &report.messages {
                table.add_row(vec![
                    row.index.to_string(),
                    row.offset.to_string(),
                    row.size.to_string(),
                    row.kind.clone(),
                    or_dash(&row.response),
                ]);
            }
            println!("{table}");
            println!("{}", session_line(&report.session));
            print_completed(&report.completed_crashes);
        }
        OutputFormat::Pretty => {
            for row in &report.messages {
                println!(
                    "#{} offset={} size={} kind={} response={}",
                    row.index,
                    row.offset,
                    row.size,
                    row.kind,
                    or_dash(&row.response)
                );
            }
            println!("{}", session_line(&report.session));
            print_completed(&report.completed_crashes);
        }
        OutputFormat::Raw => {
            for row in &report.messages {
                print_raw(&row.response_bytes);
            }
        }
    }
}

fn print_completed(crashes: &[CompletedSummary]) {
    for crash in crashes {
        println!(
            "crash file {} ({} bytes, time {})",
            crash.name, crash.size, crash.timestamp
        );
    }
}

fn session_line(session: &SessionSummary) -> String {
    let mut line = format!(
        "session device={} receiver={} sender={}",
        session.device.as_deref().unwrap_or("-"),
        session.receiver_id,
        session.sender_id
    );
    if session.negotiated {
        let _ = write!(
            line,
            " flex=0x{:02X}/0x{:02X} fields={} record={}B",
            session.protocol_version,
            session.struct_version,
            session.fields.unwrap_or(0),
            session.record_size.unwrap_or(0)
        );
    }
    if let Some(transfer) = &session.crash_transfer {
        let _ = write!(
            line,
            " crash={} {}/{}",
            transfer.name, transfer.offset, transfer.total
        );
    }
    line
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}
