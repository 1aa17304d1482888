use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use navtel_frame::codec::encode_envelope;
use navtel_frame::crash::write_data_query;
use navtel_frame::{crc8, CompletedCrash, FieldMask, ResponseBuffer, SessionState, CRASH_STATUS_QUERY};
use navtel_peer::{ConnectionInfo, ConnectionStats, PeerError, SessionObserver, TrackerListener};
use navtel_transport::{TcpServerSocket, TrackerStream};

const IMEI: &[u8] = b"868204005647838";
const CRASH_TIME: u32 = 1_700_000_000;

enum Seen {
    Crash(CompletedCrash, Option<String>),
    Closed(ConnectionStats, bool),
}

struct Forward(Mutex<mpsc::Sender<Seen>>);

impl SessionObserver for Forward {
    fn crash_transfer_complete(
        &self,
        _info: &ConnectionInfo,
        session: &SessionState,
        crash: &CompletedCrash,
    ) {
        let device = session.device_identifier.clone();
        let _ = self.0.lock().unwrap().send(Seen::Crash(crash.clone(), device));
    }

    fn connection_closed(
        &self,
        _info: &ConnectionInfo,
        stats: &ConnectionStats,
        error: Option<&PeerError>,
    ) {
        let _ = self.0.lock().unwrap().send(Seen::Closed(*stats, error.is_some()));
    }
}

fn envelope(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_envelope(1, 0x0055_0001, payload, &mut buf).unwrap();
    buf.to_vec()
}

fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
    body.push(crc8(&body));
    body
}

fn read_n(stream: &mut TrackerStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).unwrap();
    buf
}

fn data_query(offset: u32, size: u16) -> Vec<u8> {
    let mut out = ResponseBuffer::new();
    write_data_query(&mut out, CRASH_TIME, offset, size);
    out.as_slice().to_vec()
}

fn chunk(offset: u32, data: &[u8]) -> Vec<u8> {
    let mut msg = b"~D\x00\x00\x00".to_vec();
    msg.extend_from_slice(&CRASH_TIME.to_le_bytes());
    msg.extend_from_slice(&offset.to_le_bytes());
    msg.extend_from_slice(&(data.len() as u16).to_le_bytes());
    msg.extend_from_slice(data);
    with_crc(msg)
}

#[test]
fn full_session_over_tcp() {
    let listener = Arc::new(TrackerListener::bind("127.0.0.1:0").unwrap());
    let addr = listener.local_addr();
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();

    let server = {
        let listener = Arc::clone(&listener);
        let running = Arc::clone(&running);
        let observer = Arc::new(Forward(Mutex::new(tx)));
        thread::spawn(move || listener.serve(observer, running))
    };

    let mut client = TcpServerSocket::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    // identity
    let mut hello = b"*>S:".to_vec();
    hello.extend_from_slice(IMEI);
    client.write_all(&envelope(&hello)).unwrap();
    let reply = read_n(&mut client, 19);
    assert_eq!(&reply[..4], b"@NTC");
    assert_eq!(&reply[4..8], &0x0055_0001u32.to_le_bytes());
    assert_eq!(&reply[8..12], &1u32.to_le_bytes());
    assert_eq!(&reply[16..], b"*<S");

    // negotiation, answered and followed by the crash status query
    client
        .write_all(&envelope(b"*>FLEX\xB0\x14\x0A\x03\xA0"))
        .unwrap();
    let reply = read_n(&mut client, 16 + 9 + 5);
    assert_eq!(&reply[16..25], b"*<FLEX\xB0\x14\x0A");
    assert_eq!(&reply[25..], &CRASH_STATUS_QUERY);

    // single event record
    let record_size = FieldMask::from_wire(3, &[0xA0]).unwrap().record_size();
    let mut event = b"~T".to_vec();
    event.extend_from_slice(&42u32.to_le_bytes());
    event.extend(std::iter::repeat_n(0u8, record_size));
    client.write_all(&with_crc(event)).unwrap();
    let reply = read_n(&mut client, 7);
    assert_eq!(reply, with_crc(b"~T\x2A\x00\x00\x00".to_vec()));

    // crash file spanning two chunks
    let total = 70_000u32;
    let file: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

    let mut announce = b"~I\x00\x00".to_vec();
    announce.extend_from_slice(&CRASH_TIME.to_le_bytes());
    announce.extend_from_slice(&total.to_le_bytes());
    announce.extend_from_slice(&[0xFF, 9]);
    announce.extend_from_slice(b"crash.bin");
    client.write_all(&with_crc(announce)).unwrap();
    assert_eq!(read_n(&mut client, 15), data_query(0, u16::MAX));

    client.write_all(&chunk(0, &file[..65_535])).unwrap();
    assert_eq!(read_n(&mut client, 15), data_query(65_535, 4_465));

    client.write_all(&chunk(65_535, &file[65_535..])).unwrap();
    assert_eq!(read_n(&mut client, 15), data_query(70_000, 0));

    drop(client);

    let mut crashes = Vec::new();
    let stats = loop {
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Seen::Crash(crash, device) => crashes.push((crash, device)),
            Seen::Closed(stats, failed) => {
                assert!(!failed);
                break stats;
            }
        }
    };

    assert_eq!(crashes.len(), 1);
    let (crash, device) = &crashes[0];
    assert_eq!(crash.name, "crash.bin");
    assert_eq!(crash.timestamp, CRASH_TIME);
    assert_eq!(crash.data.as_ref(), file.as_slice());
    assert_eq!(device.as_deref(), Some("868204005647838"));

    assert_eq!(stats.messages, 6);
    assert_eq!(stats.crash_files, 1);
    assert_eq!(stats.crash_queries, 1);

    running.store(false, Ordering::SeqCst);
    server.join().unwrap().unwrap();
}

#[test]
fn checksum_failure_closes_connection() {
    let listener = TrackerListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr();

    let client = thread::spawn(move || {
        let mut client = TcpServerSocket::connect(addr).unwrap();
        let mut bad = envelope(b"*>S:868204005647838");
        bad[15] ^= 0x01;
        client.write_all(&bad).unwrap();
        client
    });

    let conn = listener.accept().unwrap();
    let err = conn.run(&navtel_peer::NoopObserver).unwrap_err();
    assert!(matches!(
        err,
        PeerError::Frame(ref e) if e.kind() == navtel_frame::ErrorKind::Checksum
    ));
    drop(client.join().unwrap());
}
