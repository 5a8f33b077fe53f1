//! Protocol codec
//!
//! Encoding and incremental decoding of RESP frames.
//!
//! Decoding never blocks and never consumes input on its own: given a buffer
//! it reports either a complete value plus the number of bytes it occupied,
//! or that more bytes are needed. The caller owns the buffer and advances it.
//!
//! ## Validation
//! - length prefixes are non-negative, or exactly `-1` for null
//! - a whole encoded frame, complete or still buffering, stays within the
//!   configured maximum; declared byte and element counts are checked
//!   against it as soon as they are read
//! - every terminator is exactly `\r\n`
//!
//! Any violation is a `RadishError::Protocol` carrying the byte offset.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, Bytes, BytesMut};

use super::Value;
use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::{RadishError, Result};

const CRLF: &[u8] = b"\r\n";

/// Arrays nested deeper than this are rejected
pub const MAX_NESTING_DEPTH: usize = 32;

/// Bytes pulled from the socket per read call
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Smallest possible encoded element (`+\r\n`)
const MIN_ELEMENT_SIZE: usize = 3;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value to bytes
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Append the encoding of `value` to `out`
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(n) => {
            out.push(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(CRLF);
        }
        Value::Simple(text) => {
            out.push(b'+');
            push_line_text(out, text);
            out.extend_from_slice(CRLF);
        }
        Value::Error(message) => {
            out.push(b'-');
            push_line_text(out, message);
            out.extend_from_slice(CRLF);
        }
        Value::Bulk(data) => {
            out.push(b'$');
            out.extend_from_slice(data.len().to_string().as_bytes());
            out.extend_from_slice(CRLF);
            out.extend_from_slice(data);
            out.extend_from_slice(CRLF);
        }
        Value::Null => out.extend_from_slice(b"$-1\r\n"),
        Value::NullArray => out.extend_from_slice(b"*-1\r\n"),
        Value::Array(items) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(CRLF);
            for item in items {
                encode_into(item, out);
            }
        }
    }
}

/// Line-oriented text cannot carry the terminator; CR/LF become spaces
fn push_line_text(out: &mut Vec<u8>, text: &str) {
    out.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
}

// =============================================================================
// Decoding
// =============================================================================

/// Outcome of a decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A full frame: the value and how many bytes it occupied
    Complete(Value, usize),

    /// The buffer holds only a prefix of a frame
    Incomplete,
}

/// Incremental frame decoder with a size guard
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    max_frame_size: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decode the first frame in `buf`
    pub fn decode(&self, buf: &[u8]) -> Result<Decoded> {
        match self.parse_value(buf, 0, 0)? {
            Some((_, end)) if end > self.max_frame_size => Err(RadishError::protocol(
                0,
                format!(
                    "frame of {} bytes exceeds maximum size of {} bytes",
                    end, self.max_frame_size
                ),
            )),
            Some((value, end)) => Ok(Decoded::Complete(value, end)),
            None if buf.len() > self.max_frame_size => Err(RadishError::protocol(
                0,
                format!(
                    "frame exceeds maximum size of {} bytes ({} buffered, still incomplete)",
                    self.max_frame_size,
                    buf.len()
                ),
            )),
            None => Ok(Decoded::Incomplete),
        }
    }

    /// Parse one value starting at `pos`; `None` means incomplete.
    /// On success returns the value and the position just past it.
    fn parse_value(&self, buf: &[u8], pos: usize, depth: usize) -> Result<Option<(Value, usize)>> {
        let Some(&sigil) = buf.get(pos) else {
            return Ok(None);
        };
        if !matches!(sigil, b'+' | b'-' | b':' | b'$' | b'*') {
            return Err(RadishError::protocol(
                pos,
                format!(
                    "unknown type sigil '{}', expected one of + - : $ *",
                    sigil.escape_ascii()
                ),
            ));
        }
        let Some((line, next)) = read_line(buf, pos + 1) else {
            return Ok(None);
        };

        match sigil {
            b'+' => Ok(Some((Value::Simple(line_text(line, pos + 1)?), next))),
            b'-' => Ok(Some((Value::Error(line_text(line, pos + 1)?), next))),
            b':' => Ok(Some((Value::Integer(parse_integer(line, pos + 1)?), next))),
            b'$' => self.parse_bulk(buf, line, pos + 1, next),
            _ => self.parse_array(buf, line, pos + 1, next, depth),
        }
    }

    fn parse_bulk(
        &self,
        buf: &[u8],
        line: &[u8],
        line_offset: usize,
        body: usize,
    ) -> Result<Option<(Value, usize)>> {
        let len = match self.parse_length(line, line_offset, "bulk string")? {
            Some(len) => len,
            None => return Ok(Some((Value::Null, body))),
        };

        let body_end = body + len;
        if buf.len() < body_end + CRLF.len() {
            return Ok(None);
        }

        let terminator = &buf[body_end..body_end + CRLF.len()];
        if terminator != CRLF {
            return Err(RadishError::protocol(
                body_end,
                format!(
                    "expected \"\\r\\n\" after {} byte bulk payload, found \"{}\"",
                    len,
                    terminator.escape_ascii()
                ),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[body..body_end]);
        Ok(Some((Value::Bulk(data), body_end + CRLF.len())))
    }

    fn parse_array(
        &self,
        buf: &[u8],
        line: &[u8],
        line_offset: usize,
        first: usize,
        depth: usize,
    ) -> Result<Option<(Value, usize)>> {
        let count = match self.parse_length(line, line_offset, "array")? {
            Some(count) => count,
            None => return Ok(Some((Value::NullArray, first))),
        };

        if count > self.max_frame_size / MIN_ELEMENT_SIZE {
            return Err(RadishError::protocol(
                line_offset,
                format!(
                    "array of {} elements cannot fit in {} bytes",
                    count, self.max_frame_size
                ),
            ));
        }
        if depth >= MAX_NESTING_DEPTH {
            return Err(RadishError::protocol(
                line_offset - 1,
                format!("arrays nested deeper than {}", MAX_NESTING_DEPTH),
            ));
        }

        // Capacity grows with the data actually received, not the declared count.
        let mut items = Vec::with_capacity(count.min(64));
        let mut pos = first;
        for _ in 0..count {
            match self.parse_value(buf, pos, depth + 1)? {
                Some((item, next)) => {
                    items.push(item);
                    pos = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((Value::Array(items), pos)))
    }

    /// Length prefix: non-negative, or `-1` for null (returned as `None`)
    fn parse_length(&self, line: &[u8], offset: usize, what: &str) -> Result<Option<usize>> {
        let n = parse_integer(line, offset)?;
        if n == -1 {
            return Ok(None);
        }
        if n < 0 {
            return Err(RadishError::protocol(
                offset,
                format!("invalid {} length {}, expected >= 0 or -1", what, n),
            ));
        }

        let len = n as u64;
        if len > self.max_frame_size as u64 {
            return Err(RadishError::protocol(
                offset,
                format!(
                    "{} length {} exceeds maximum frame size of {} bytes",
                    what, len, self.max_frame_size
                ),
            ));
        }
        Ok(Some(len as usize))
    }
}

/// Decode the first frame in `buf` with the default size limit
pub fn decode(buf: &[u8]) -> Result<Decoded> {
    Decoder::default().decode(buf)
}

/// Find the line starting at `start`; returns its content and the position
/// after the terminator.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let end = rest.windows(CRLF.len()).position(|w| w == CRLF)?;
    Some((&rest[..end], start + end + CRLF.len()))
}

fn line_text(line: &[u8], offset: usize) -> Result<String> {
    String::from_utf8(line.to_vec())
        .map_err(|e| {
            RadishError::protocol(
                offset + e.utf8_error().valid_up_to(),
                "line is not valid UTF-8",
            )
        })
}

/// Strict signed decimal: optional '-', then one or more digits
fn parse_integer(line: &[u8], offset: usize) -> Result<i64> {
    let digits = line.strip_prefix(b"-").unwrap_or(line);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(RadishError::protocol(
            offset,
            format!("expected integer, found \"{}\"", line.escape_ascii()),
        ));
    }

    // All bytes are ASCII at this point.
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            RadishError::protocol(
                offset,
                format!("integer \"{}\" out of range", line.escape_ascii()),
            )
        })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete value from a stream
///
/// Bytes beyond the frame stay in `buffer` for the next call. Returns
/// `Ok(None)` on a clean EOF (nothing buffered).
pub fn read_value<R: Read>(
    reader: &mut R,
    buffer: &mut BytesMut,
    decoder: &Decoder,
) -> Result<Option<Value>> {
    loop {
        if let Decoded::Complete(value, consumed) = decoder.decode(buffer)? {
            buffer.advance(consumed);
            return Ok(Some(value));
        }

        if !fill_buffer(reader, buffer)? {
            return if buffer.is_empty() {
                Ok(None)
            } else {
                Err(std::io::Error::new(
                    ErrorKind::ConnectionReset,
                    "connection closed in the middle of a frame",
                )
                .into())
            };
        }
    }
}

/// Pull the next chunk from `reader` into `buffer`; `false` on EOF
pub(crate) fn fill_buffer<R: Read>(reader: &mut R, buffer: &mut BytesMut) -> Result<bool> {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                return Ok(true);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write a value to a stream (no flush)
pub fn write_value<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    writer.write_all(&encode(value))?;
    Ok(())
}
