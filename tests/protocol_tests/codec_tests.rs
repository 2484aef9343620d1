//! Codec Tests
//!
//! Tests for command and response encoding/decoding.

use std::io::Cursor;

use threatsieve::protocol::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, Command, CommandType, Response, Status,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use threatsieve::{IndicatorRecord, LookupMode, Resolution, SieveError};

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_resolve_direct() {
    let cmd = Command::resolve_direct("1.2.3.4");
    let encoded = encode_command(&cmd);

    assert_eq!(encoded[0], CommandType::ResolveDirect as u8);
    assert_eq!(decode_command(&encoded).unwrap(), cmd);
}

#[test]
fn test_encode_decode_resolve_accelerated() {
    let cmd = Command::resolve_accelerated("evil.example.com");
    let encoded = encode_command(&cmd);

    assert_eq!(encoded[0], 0x02);
    match decode_command(&encoded).unwrap() {
        Command::Resolve { mode, key } => {
            assert_eq!(mode, LookupMode::Accelerated);
            assert_eq!(key, "evil.example.com");
        }
        other => panic!("Expected RESOLVE command, got {:?}", other),
    }
}

#[test]
fn test_resolve_wire_layout() {
    let encoded = encode_command(&Command::resolve_direct("ab"));
    // cmd | len=6 | key_len=2 | "ab"
    assert_eq!(encoded, vec![0x01, 0, 0, 0, 6, 0, 0, 0, 2, b'a', b'b']);
}

#[test]
fn test_encode_decode_empty_key() {
    let cmd = Command::resolve_direct("");
    let decoded = decode_command(&encode_command(&cmd)).unwrap();
    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_unicode_key() {
    let cmd = Command::resolve_accelerated("bücher.example");
    assert_eq!(decode_command(&encode_command(&cmd)).unwrap(), cmd);
}

#[test]
fn test_encode_decode_rebuild() {
    let cmd = Command::Rebuild {
        expected_count: 2_000_000,
        false_positive_rate: 0.001,
    };
    let encoded = encode_command(&cmd);

    assert_eq!(encoded.len(), HEADER_SIZE + 16);
    assert_eq!(decode_command(&encoded).unwrap(), cmd);
}

#[test]
fn test_encode_decode_ping_and_stats() {
    for cmd in [Command::Ping, Command::Stats] {
        let encoded = encode_command(&cmd);
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(decode_command(&encoded).unwrap(), cmd);
    }
}

// =============================================================================
// Command Error Tests
// =============================================================================

#[test]
fn test_decode_unknown_command() {
    let err = decode_command(&[0x7f, 0, 0, 0, 0]).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_incomplete_header() {
    let err = decode_command(&[0x01, 0, 0]).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_incomplete_payload() {
    let mut encoded = encode_command(&Command::resolve_direct("1.2.3.4"));
    encoded.truncate(encoded.len() - 2);
    let err = decode_command(&encoded).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_key_length_mismatch() {
    // Frame says 8 payload bytes, key_len says 10
    let bytes = [0x01, 0, 0, 0, 8, 0, 0, 0, 10, b'a', b'b', b'c', b'd'];
    let err = decode_command(&bytes).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_non_utf8_key() {
    let bytes = [0x02, 0, 0, 0, 6, 0, 0, 0, 2, 0xff, 0xfe];
    let err = decode_command(&bytes).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(msg) if msg.contains("UTF-8")));
}

#[test]
fn test_decode_short_rebuild_payload() {
    let bytes = [0x03, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 3, 0xe8];
    let err = decode_command(&bytes).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_ping_with_payload() {
    let err = decode_command(&[0x04, 0, 0, 0, 1, 0xaa]).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_oversized_payload() {
    let len = (MAX_PAYLOAD_SIZE + 1).to_be_bytes();
    let bytes = [0x01, len[0], len[1], len[2], len[3]];
    let err = decode_command(&bytes).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(msg) if msg.contains("too large")));
}

// =============================================================================
// Response Encoding/Decoding Tests
// =============================================================================

fn sample_record() -> IndicatorRecord {
    IndicatorRecord::new("phishing", "FR", "login-verify.example", "domain", "feed-b")
}

#[test]
fn test_encode_decode_found() {
    let resp = Response::found(&sample_record()).unwrap();
    let decoded = decode_response(&encode_response(&resp)).unwrap();

    assert_eq!(decoded.status, Status::Found);
    assert_eq!(
        decoded.into_resolution().unwrap(),
        Resolution::Found(sample_record())
    );
}

#[test]
fn test_encode_decode_not_found_and_filtered() {
    let decoded = decode_response(&encode_response(&Response::not_found())).unwrap();
    assert_eq!(decoded.status, Status::NotFound);
    assert!(decoded.payload.is_none());
    assert_eq!(decoded.into_resolution().unwrap(), Resolution::NotFoundConfirmed);

    let decoded = decode_response(&encode_response(&Response::filtered())).unwrap();
    assert_eq!(decoded.status, Status::Filtered);
    assert_eq!(decoded.into_resolution().unwrap(), Resolution::NotFoundFiltered);
}

#[test]
fn test_encode_decode_error() {
    let resp = Response::error("Store error: Store unavailable: down");
    let decoded = decode_response(&encode_response(&resp)).unwrap();

    assert_eq!(decoded.status, Status::Error);
    assert_eq!(decoded.error_message(), "Store error: Store unavailable: down");
    assert!(matches!(
        decoded.into_resolution().unwrap_err(),
        SieveError::Remote(_)
    ));
}

#[test]
fn test_from_resolution_matches_outcome() {
    let cases = [
        (Resolution::Found(sample_record()), Status::Found),
        (Resolution::NotFoundConfirmed, Status::NotFound),
        (Resolution::NotFoundFiltered, Status::Filtered),
    ];

    for (resolution, status) in cases {
        let resp = Response::from_resolution(&resolution).unwrap();
        assert_eq!(resp.status, status);
        assert_eq!(resp.into_resolution().unwrap(), resolution);
    }
}

#[test]
fn test_ok_is_not_a_lookup_result() {
    let err = Response::ok(None).into_resolution().unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_decode_unknown_status() {
    let err = decode_response(&[0x42, 0, 0, 0, 0]).unwrap_err();
    assert!(matches!(err, SieveError::Protocol(_)));
}

#[test]
fn test_status_from_byte() {
    assert_eq!(Status::from_byte(0x00), Some(Status::Ok));
    assert_eq!(Status::from_byte(0x03), Some(Status::Filtered));
    assert_eq!(Status::from_byte(0x04), Some(Status::Error));
    assert_eq!(Status::from_byte(0x05), None);
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_commands_in_sequence() {
    let commands = vec![
        Command::resolve_direct("1.1.1.1"),
        Command::resolve_accelerated("2.2.2.2"),
        Command::Rebuild {
            expected_count: 10,
            false_positive_rate: 0.5,
        },
        Command::Stats,
        Command::Ping,
    ];

    let mut buf = Vec::new();
    for cmd in &commands {
        write_command(&mut buf, cmd).unwrap();
    }

    let mut cursor = Cursor::new(buf);
    for expected in &commands {
        assert_eq!(&read_command(&mut cursor).unwrap(), expected);
    }

    // Stream exhausted
    assert!(matches!(read_command(&mut cursor), Err(SieveError::Io(_))));
}

#[test]
fn test_stream_response() {
    let mut buf = Vec::new();
    write_response(&mut buf, &Response::found(&sample_record()).unwrap()).unwrap();
    write_response(&mut buf, &Response::ok(Some(b"PONG".to_vec()))).unwrap();

    let mut cursor = Cursor::new(buf);
    let first = read_response(&mut cursor).unwrap();
    assert_eq!(first.status, Status::Found);

    let second = read_response(&mut cursor).unwrap();
    assert_eq!(second.status, Status::Ok);
    assert_eq!(second.payload, Some(b"PONG".to_vec()));
}

#[test]
fn test_stream_truncated_frame() {
    let mut encoded = encode_command(&Command::resolve_direct("9.9.9.9"));
    encoded.pop();

    let err = read_command(&mut Cursor::new(encoded)).unwrap_err();
    assert!(matches!(err, SieveError::Io(_)));
}
