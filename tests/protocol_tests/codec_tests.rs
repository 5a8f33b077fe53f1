//! Codec Tests
//!
//! Tests for value encoding and incremental decoding.

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use radishkv::protocol::{
    decode, encode, read_value, write_value, Command, Decoded, Decoder, Value,
};
use radishkv::RadishError;

// =============================================================================
// Helper Functions
// =============================================================================

fn decode_complete(bytes: &[u8]) -> (Value, usize) {
    match decode(bytes).unwrap() {
        Decoded::Complete(value, consumed) => (value, consumed),
        Decoded::Incomplete => panic!("Expected complete frame for {:?}", bytes),
    }
}

fn protocol_error(bytes: &[u8]) -> (usize, String) {
    match decode(bytes) {
        Err(RadishError::Protocol { offset, message }) => (offset, message),
        other => panic!("Expected protocol error, got {:?}", other),
    }
}

fn sample_values() -> Vec<Value> {
    vec![
        Value::Integer(0),
        Value::Integer(-42),
        Value::Integer(i64::MAX),
        Value::ok(),
        Value::simple("PONG"),
        Value::Error("ERR something went wrong".to_string()),
        Value::bulk("hello"),
        Value::bulk(""),
        Value::bulk(b"line\r\nbreak"),
        Value::Bulk(Bytes::from((0..=255u8).collect::<Vec<_>>())),
        Value::Null,
        Value::NullArray,
        Value::Array(vec![]),
        Value::Array(vec![Value::bulk("foo"), Value::Null, Value::bulk("bar")]),
        Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
        Command::new("MSET").arg("k1").arg("v1").arg("k2").arg("v2").to_value(),
    ]
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_integer() {
    assert_eq!(encode(&Value::Integer(123)), b":123\r\n");
    assert_eq!(encode(&Value::Integer(-7)), b":-7\r\n");
}

#[test]
fn test_encode_status_and_error() {
    assert_eq!(encode(&Value::ok()), b"+OK\r\n");
    assert_eq!(encode(&Value::error("bad thing")), b"-ERR bad thing\r\n");
}

#[test]
fn test_encode_bulk_and_null() {
    assert_eq!(encode(&Value::bulk("foobar")), b"$6\r\nfoobar\r\n");
    assert_eq!(encode(&Value::bulk("")), b"$0\r\n\r\n");
    assert_eq!(encode(&Value::Null), b"$-1\r\n");
    assert_eq!(encode(&Value::NullArray), b"*-1\r\n");
}

#[test]
fn test_encode_array() {
    let value = Value::Array(vec![Value::bulk("foo"), Value::Null, Value::bulk("bar")]);
    assert_eq!(encode(&value), b"*3\r\n$3\r\nfoo\r\n$-1\r\n$3\r\nbar\r\n");
    assert_eq!(encode(&Value::Array(vec![])), b"*0\r\n");
}

#[test]
fn test_encode_command_as_bulk_array() {
    let command = Command::new("SET").arg("a").arg("1");
    assert_eq!(
        encode(&command.to_value()),
        b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n"
    );
}

#[test]
fn test_encode_line_text_never_breaks_framing() {
    let encoded = encode(&Value::simple("two\r\nlines"));
    assert_eq!(encoded, b"+two  lines\r\n");

    let (value, consumed) = decode_complete(&encoded);
    assert_eq!(value, Value::simple("two  lines"));
    assert_eq!(consumed, encoded.len());
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_round_trip_all_kinds() {
    for value in sample_values() {
        let encoded = encode(&value);
        let (decoded, consumed) = decode_complete(&encoded);
        assert_eq!(decoded, value);
        assert_eq!(consumed, encoded.len());
    }
}

#[test]
fn test_every_prefix_is_incomplete() {
    for value in sample_values() {
        let encoded = encode(&value);
        for split in 0..encoded.len() {
            assert_eq!(
                decode(&encoded[..split]).unwrap(),
                Decoded::Incomplete,
                "prefix of {} bytes of {:?}",
                split,
                value
            );
        }
    }
}

#[test]
fn test_incremental_feed_matches_whole_decode() {
    let value = Command::new("SET").arg("key").arg("some value").to_value();
    let encoded = encode(&value);

    for split in 1..encoded.len() {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&encoded[..split]);
        assert_eq!(decode(&buffer).unwrap(), Decoded::Incomplete);

        buffer.extend_from_slice(&encoded[split..]);
        assert_eq!(
            decode(&buffer).unwrap(),
            Decoded::Complete(value.clone(), encoded.len())
        );
    }
}

#[test]
fn test_decode_leaves_trailing_frames() {
    let mut bytes = encode(&Value::Integer(1));
    bytes.extend_from_slice(&encode(&Value::bulk("next")));

    let (first, consumed) = decode_complete(&bytes);
    assert_eq!(first, Value::Integer(1));
    assert_eq!(consumed, 4);

    let (second, _) = decode_complete(&bytes[consumed..]);
    assert_eq!(second, Value::bulk("next"));
}

#[test]
fn test_decode_bulk_with_embedded_terminator() {
    let (value, _) = decode_complete(b"$4\r\n\r\n\r\n\r\n");
    assert_eq!(value, Value::bulk("\r\n\r\n"));
}

#[test]
fn test_command_from_value() {
    let (value, _) = decode_complete(b"*2\r\n$3\r\nget\r\n$3\r\nkey\r\n");
    let command = Command::from_value(value).unwrap();

    assert!(command.is("GET"));
    assert_eq!(command.name(), "GET");
    assert_eq!(command.arguments(), &[Bytes::from_static(b"key")]);
}

#[test]
fn test_command_from_non_array_is_command_error() {
    let err = Command::from_value(Value::Integer(5)).unwrap_err();
    assert!(matches!(err, RadishError::Command(_)));

    let err = Command::from_value(Value::Array(vec![])).unwrap_err();
    assert!(matches!(err, RadishError::Command(_)));

    let err = Command::from_value(Value::Array(vec![Value::Integer(1)])).unwrap_err();
    assert!(err.to_string().contains("bulk strings"));
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_unknown_sigil() {
    let (offset, message) = protocol_error(b"?foo\r\n");
    assert_eq!(offset, 0);
    assert!(message.contains("unknown type sigil"));
}

#[test]
fn test_unknown_sigil_detected_before_terminator() {
    let (offset, _) = protocol_error(b"GET key");
    assert_eq!(offset, 0);
}

#[test]
fn test_negative_length_other_than_null() {
    let (offset, message) = protocol_error(b"$-2\r\n");
    assert_eq!(offset, 1);
    assert!(message.contains("-2"));

    let (_, message) = protocol_error(b"*-5\r\n");
    assert!(message.contains("array"));
}

#[test]
fn test_non_numeric_length() {
    let (_, message) = protocol_error(b"$abc\r\n");
    assert!(message.contains("expected integer"));

    let (_, message) = protocol_error(b":12x\r\n");
    assert!(message.contains("12x"));
}

#[test]
fn test_bad_bulk_terminator() {
    let (offset, message) = protocol_error(b"$3\r\nfooXY");
    assert_eq!(offset, 7);
    assert!(message.contains("XY"));
}

#[test]
fn test_bulk_length_over_limit() {
    let decoder = Decoder::new(16);
    match decoder.decode(b"$17\r\n") {
        Err(RadishError::Protocol { message, .. }) => assert!(message.contains("exceeds")),
        other => panic!("Expected protocol error, got {:?}", other),
    }

    // "$16\r\n" + payload + "\r\n" is 23 bytes
    let frame = encode(&Value::bulk([b'a'; 16]));
    assert!(matches!(
        decoder.decode(&frame),
        Err(RadishError::Protocol { .. })
    ));
    assert!(matches!(
        Decoder::new(23).decode(&frame).unwrap(),
        Decoded::Complete(_, 23)
    ));
}

#[test]
fn test_frame_at_limit_decodes_across_splits() {
    let frame = encode(&Value::bulk([b'a'; 16]));
    let decoder = Decoder::new(frame.len());

    for split in 0..frame.len() {
        assert_eq!(decoder.decode(&frame[..split]).unwrap(), Decoded::Incomplete);
    }
    assert!(matches!(
        decoder.decode(&frame).unwrap(),
        Decoded::Complete(_, _)
    ));
}

#[test]
fn test_array_count_over_limit() {
    let decoder = Decoder::new(30);
    assert!(matches!(
        decoder.decode(b"*11\r\n"),
        Err(RadishError::Protocol { .. })
    ));
}

#[test]
fn test_unterminated_line_over_limit() {
    let decoder = Decoder::new(8);
    assert_eq!(decoder.decode(b"+abcdefg").unwrap(), Decoded::Incomplete);
    assert!(matches!(
        decoder.decode(b"+abcdefgh"),
        Err(RadishError::Protocol { .. })
    ));
}

#[test]
fn test_nesting_depth_limit() {
    let mut frame = Vec::new();
    for _ in 0..40 {
        frame.extend_from_slice(b"*1\r\n");
    }
    frame.extend_from_slice(b":1\r\n");

    match decode(&frame) {
        Err(RadishError::Protocol { message, .. }) => assert!(message.contains("nested")),
        other => panic!("Expected protocol error, got {:?}", other),
    }
}

#[test]
fn test_error_inside_array_reports_absolute_offset() {
    let (offset, _) = protocol_error(b"*2\r\n:1\r\n?\r\n");
    assert_eq!(offset, 8);
}

// =============================================================================
// Stream-based I/O Tests
// =============================================================================

#[test]
fn test_write_then_read_values_from_stream() {
    let mut wire = Vec::new();
    write_value(&mut wire, &Value::ok()).unwrap();
    write_value(&mut wire, &Value::Integer(2)).unwrap();

    let mut reader = Cursor::new(wire);
    let mut buffer = BytesMut::new();
    let decoder = Decoder::default();

    assert_eq!(
        read_value(&mut reader, &mut buffer, &decoder).unwrap(),
        Some(Value::ok())
    );
    assert_eq!(
        read_value(&mut reader, &mut buffer, &decoder).unwrap(),
        Some(Value::Integer(2))
    );
    assert_eq!(read_value(&mut reader, &mut buffer, &decoder).unwrap(), None);
}

#[test]
fn test_read_value_eof_mid_frame() {
    let mut reader = Cursor::new(b"$10\r\nabc".to_vec());
    let mut buffer = BytesMut::new();

    let err = read_value(&mut reader, &mut buffer, &Decoder::default()).unwrap_err();
    match err {
        RadishError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
        other => panic!("Expected IO error, got {:?}", other),
    }
}
