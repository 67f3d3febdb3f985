//! RESP codec
//!
//! Frame-level encoding and decoding for the wire protocol. Commands are
//! arrays of bulk strings; replies are simple strings, errors, bulk
//! strings or the null bulk.

use std::io::{BufRead, Read, Write};

use crate::error::{EmberError, Result};

/// Upper bound on elements in a command array
const MAX_ARGS: usize = 128;

/// Upper bound on a single bulk string (16 MB)
const MAX_BULK_LEN: usize = 16 * 1024 * 1024;

/// A reply to send to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+...\r\n`
    Simple(String),

    /// `-...\r\n`
    Error(String),

    /// `$len\r\n...\r\n`
    Bulk(Vec<u8>),

    /// `$-1\r\n`
    NullBulk,
}

impl Reply {
    /// Encode this reply onto a stream
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Reply::Simple(s) => {
                writer.write_all(b"+")?;
                writer.write_all(s.as_bytes())?;
                writer.write_all(b"\r\n")?;
            }
            Reply::Error(msg) => {
                writer.write_all(b"-")?;
                writer.write_all(msg.as_bytes())?;
                writer.write_all(b"\r\n")?;
            }
            Reply::Bulk(data) => {
                writer.write_all(format!("${}\r\n", data.len()).as_bytes())?;
                writer.write_all(data)?;
                writer.write_all(b"\r\n")?;
            }
            Reply::NullBulk => {
                writer.write_all(b"$-1\r\n")?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Read one command (an array of bulk strings) from a stream.
///
/// Returns `Ok(None)` on a clean end of stream before any frame data.
pub fn read_command<R: BufRead>(reader: &mut R) -> Result<Option<Vec<Vec<u8>>>> {
    let line = match read_line(reader)? {
        Some(line) => line,
        None => return Ok(None),
    };

    if line.is_empty() {
        return Err(EmberError::Protocol("empty line".to_string()));
    }
    if line[0] != b'*' {
        return Err(EmberError::Protocol(format!(
            "unknown RESP type: {}",
            line[0] as char
        )));
    }

    let count = parse_int(&line[1..])
        .ok_or_else(|| EmberError::Protocol("invalid array length".to_string()))?;
    if count > MAX_ARGS {
        return Err(EmberError::Protocol(format!(
            "array too long: {} elements (max {})",
            count, MAX_ARGS
        )));
    }

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        args.push(read_bulk(reader)?);
    }
    Ok(Some(args))
}

/// Read one reply from a stream (client side)
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let line = read_line(reader)?
        .ok_or_else(|| EmberError::Protocol("connection closed mid-reply".to_string()))?;

    if line.is_empty() {
        return Err(EmberError::Protocol("empty reply line".to_string()));
    }

    match line[0] {
        b'+' => Ok(Reply::Simple(String::from_utf8_lossy(&line[1..]).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(&line[1..]).into_owned())),
        b'$' => {
            if &line[1..] == b"-1" {
                return Ok(Reply::NullBulk);
            }
            let len = parse_int(&line[1..])
                .ok_or_else(|| EmberError::Protocol("invalid bulk string length".to_string()))?;
            if len > MAX_BULK_LEN {
                return Err(EmberError::Protocol(format!(
                    "bulk string too long: {} bytes (max {})",
                    len, MAX_BULK_LEN
                )));
            }
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data)?;
            read_crlf(reader)?;
            Ok(Reply::Bulk(data))
        }
        other => Err(EmberError::Protocol(format!(
            "unknown RESP type: {}",
            other as char
        ))),
    }
}

// =============================================================================
// Frame primitives
// =============================================================================

/// Read a bulk string: `$len\r\n<bytes>\r\n`
fn read_bulk<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let line = read_line(reader)?
        .ok_or_else(|| EmberError::Protocol("connection closed mid-command".to_string()))?;

    if line.first() != Some(&b'$') {
        return Err(EmberError::Protocol(format!(
            "expected bulk string, got: {}",
            String::from_utf8_lossy(&line)
        )));
    }

    let len = parse_int(&line[1..])
        .ok_or_else(|| EmberError::Protocol("invalid bulk string length".to_string()))?;
    if len > MAX_BULK_LEN {
        return Err(EmberError::Protocol(format!(
            "bulk string too long: {} bytes (max {})",
            len, MAX_BULK_LEN
        )));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    read_crlf(reader)?;
    Ok(data)
}

/// Read a line up to `\n`, stripping the `\r\n` terminator.
///
/// Returns `Ok(None)` on end of stream before any bytes.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Consume the `\r\n` trailing a bulk string payload
fn read_crlf<R: Read>(reader: &mut R) -> Result<()> {
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if &crlf != b"\r\n" {
        return Err(EmberError::Protocol(
            "bulk string missing terminator".to_string(),
        ));
    }
    Ok(())
}

/// Parse a non-negative decimal integer from ASCII bytes
fn parse_int(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

// =============================================================================
// Client-side helpers
// =============================================================================

/// Encode a command as a RESP array of bulk strings
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut message = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        message.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        message.extend_from_slice(arg);
        message.extend_from_slice(b"\r\n");
    }
    message
}
