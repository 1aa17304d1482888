use std::fs;

use navtel_frame::{
    Dispatcher, SessionEvent, SessionState, ENVELOPE_PREFIX, HEADER_SIZE, PING_PREFIX,
    TELEMETRY_PREFIX,
};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INCOMPLETE, SUCCESS, USAGE};
use crate::output::{
    print_decode, CompletedSummary, DecodeReport, MessageRow, OutputFormat,
    SessionSummary,
};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = load_input(&args)?;
    let report = decode_capture(&Dispatcher::default(), &input)?;
    print_decode(&report, format);

    if report.trailing > 0 {
        return Err(CliError::new(
            DATA_INCOMPLETE,
            format!(
                "{} trailing bytes do not form a complete message",
                report.trailing
            ),
        ));
    }
    Ok(SUCCESS)
}

fn load_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    match (&args.hex, &args.file) {
        (Some(hex), _) => parse_hex(hex),
        (None, Some(path)) => {
            let data = fs::read(path).map_err(|err| io_error("cannot read capture", err))?;
            if args.binary {
                Ok(data)
            } else {
                parse_hex(&String::from_utf8_lossy(&data))
            }
        }
        (None, None) => Err(CliError::new(USAGE, "no capture given")),
    }
}

/// Run every complete message in `input` through one session.
fn decode_capture(dispatcher: &Dispatcher, input: &[u8]) -> CliResult<DecodeReport> {
    let mut state = SessionState::new();
    let mut messages = Vec::new();
    let mut completed_crashes = Vec::new();
    let mut offset = 0usize;

    while offset < input.len() {
        let decoded = dispatcher
            .decode(&mut state, &input[offset..])
            .map_err(|err| frame_error(&format!("message at offset {offset}"), err))?;
        let Some(decoded) = decoded else {
            break;
        };

        let message = &input[offset..offset + decoded.len];
        messages.push(MessageRow {
            index: messages.len(),
            offset,
            size: decoded.len,
            kind: describe(message),
            response: hex::encode(&decoded.response),
            response_bytes: decoded.response.to_vec(),
        });
        for event in state.take_events() {
            match event {
                SessionEvent::CrashTransferComplete(crash) => {
                    completed_crashes.push(CompletedSummary {
                        name: crash.name,
                        timestamp: crash.timestamp,
                        size: crash.data.len(),
                    });
                }
            }
        }
        offset += decoded.len;
    }

    Ok(DecodeReport {
        messages,
        completed_crashes,
        trailing: input.len() - offset,
        session: SessionSummary::from(&state),
    })
}

/// Short label for a complete message, e.g. `ntcb *>FLEX` or `flex ~A`.
fn describe(message: &[u8]) -> String {
    match message.first() {
        Some(&ENVELOPE_PREFIX) => {
            let body = message.get(HEADER_SIZE..).unwrap_or_default();
            let ident: String = body
                .iter()
                .take_while(|b| b.is_ascii_graphic() && **b != b':')
                .take(8)
                .map(|b| *b as char)
                .collect();
            format!("ntcb {ident}")
        }
        Some(&TELEMETRY_PREFIX) => match message.get(1) {
            Some(sub) if sub.is_ascii_graphic() => format!("flex ~{}", *sub as char),
            Some(sub) => format!("flex 0x{sub:02X}"),
            None => "flex".to_string(),
        },
        Some(&PING_PREFIX) => "ping".to_string(),
        Some(other) => format!("0x{other:02X}"),
        None => String::new(),
    }
}

fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !matches!(c, ':' | '-'))
        .collect();
    hex::decode(&digits).map_err(hex_error)
}

fn hex_error(err: hex::FromHexError) -> CliError {
    CliError::new(USAGE, format!("invalid hex capture: {err}"))
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use navtel_frame::codec::encode_envelope;
    use navtel_frame::crc8;

    use super::*;
    use crate::exit::DATA_INVALID;

    fn envelope(payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_envelope(3, 4, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn parse_hex_ignores_separators() {
        assert_eq!(parse_hex("7e 51:7B-00\n5b").unwrap(), vec![0x7E, 0x51, 0x7B, 0x00, 0x5B]);
        assert_eq!(parse_hex("7e5").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(
            parse_hex("7E:0A").unwrap(),
            hex::decode("7e0a").unwrap()
        );
    }

    #[test]
    fn describes_each_protocol() {
        assert_eq!(describe(&envelope(b"*>S:868204005647838")), "ntcb *>S");
        assert_eq!(describe(&envelope(b"*>FLEX\xB0\x14\x0A\x00")), "ntcb *>FLEX");
        assert_eq!(describe(b"~A\x01"), "flex ~A");
        assert_eq!(describe(&[0x7F]), "ping");
    }

    #[test]
    fn capture_is_decoded_in_one_session() {
        let mut input = envelope(b"*>S:868204005647838");
        input.extend(envelope(b"*>FLEX\xB0\x14\x0A\x03\xA0"));
        input.push(0x7F);
        let mut event = b"~T\x05\x00\x00\x00".to_vec();
        event.extend([0u8; 8]);
        event.push(crc8(&event));
        input.extend(&event);

        let report = decode_capture(&Dispatcher::default(), &input).unwrap();
        assert_eq!(report.messages.len(), 4);
        assert_eq!(report.trailing, 0);
        assert_eq!(report.messages[2].kind, "ping");
        assert!(report.messages[2].response.is_empty());
        assert!(report.messages[3].response.starts_with("7e5405000000"));
        assert_eq!(report.session.device.as_deref(), Some("868204005647838"));
        assert_eq!(report.session.record_size, Some(8));
    }

    #[test]
    fn partial_trailer_is_reported_and_bad_checksum_fails() {
        let mut input = vec![0x7F];
        input.extend_from_slice(b"~A");
        let report = decode_capture(&Dispatcher::default(), &input).unwrap();
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.trailing, 2);

        let mut bad = envelope(b"*>S:868204005647838");
        bad[14] ^= 0xFF;
        let err = decode_capture(&Dispatcher::default(), &bad).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("message at offset 0"));
    }
}
