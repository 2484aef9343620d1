//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - RESOLVE_*: key_len (4 bytes) + key (UTF-8)
//! - REBUILD:   expected_count (8 bytes) + false_positive_rate (f64, 8 bytes)
//! - PING:      empty
//! - STATS:     empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, SieveError};
use crate::resolver::LookupMode;

use super::{Command, Response, Status};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// REBUILD payload: u64 + f64
const REBUILD_PAYLOAD_SIZE: usize = 16;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut payload = BytesMut::new();
    match command {
        Command::Resolve { key, .. } => {
            payload.reserve(4 + key.len());
            payload.put_u32(key.len() as u32);
            payload.put_slice(key.as_bytes());
        }
        Command::Rebuild {
            expected_count,
            false_positive_rate,
        } => {
            payload.reserve(REBUILD_PAYLOAD_SIZE);
            payload.put_u64(*expected_count);
            payload.put_f64(*false_positive_rate);
        }
        Command::Ping | Command::Stats => {}
    }

    frame(command.command_type() as u8, &payload)
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_frame(bytes, "command")?;

    match cmd_type {
        0x01 => decode_resolve(payload, LookupMode::Direct),
        0x02 => decode_resolve(payload, LookupMode::Accelerated),
        0x03 => decode_rebuild(payload),
        0x04 => expect_empty(payload, "PING").map(|_| Command::Ping),
        0x05 => expect_empty(payload, "STATS").map(|_| Command::Stats),
        _ => Err(SieveError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            cmd_type
        ))),
    }
}

/// Decode RESOLVE payload: key_len (4) + key
fn decode_resolve(mut payload: &[u8], mode: LookupMode) -> Result<Command> {
    if payload.remaining() < 4 {
        return Err(SieveError::Protocol(
            "RESOLVE command: missing key length".to_string(),
        ));
    }

    let key_len = payload.get_u32() as usize;
    if payload.remaining() != key_len {
        return Err(SieveError::Protocol(format!(
            "RESOLVE command: key length {} but {} bytes follow",
            key_len,
            payload.remaining()
        )));
    }

    let key = String::from_utf8(payload.to_vec())
        .map_err(|_| SieveError::Protocol("RESOLVE command: key is not UTF-8".to_string()))?;

    Ok(Command::Resolve { mode, key })
}

/// Decode REBUILD payload: expected_count (8) + false_positive_rate (8)
fn decode_rebuild(mut payload: &[u8]) -> Result<Command> {
    if payload.remaining() != REBUILD_PAYLOAD_SIZE {
        return Err(SieveError::Protocol(format!(
            "REBUILD command: expected {} payload bytes, got {}",
            REBUILD_PAYLOAD_SIZE,
            payload.remaining()
        )));
    }

    Ok(Command::Rebuild {
        expected_count: payload.get_u64(),
        false_positive_rate: payload.get_f64(),
    })
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(SieveError::Protocol(format!(
            "{} command: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = Status::from_byte(status_byte).ok_or_else(|| {
        SieveError::Protocol(format!("Unknown response status: 0x{:02x}", status_byte))
    })?;

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Framing
// =============================================================================

/// Prefix `payload` with its type byte and length
fn frame(type_byte: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(type_byte);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);
    message.to_vec()
}

/// Validate a complete frame and split it into (type byte, payload)
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(SieveError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let type_byte = header.get_u8();
    let payload_len = header.get_u32();

    check_payload_len(payload_len)?;

    let total_len = HEADER_SIZE + payload_len as usize;
    if bytes.len() < total_len {
        return Err(SieveError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((type_byte, &bytes[HEADER_SIZE..total_len]))
}

fn check_payload_len(payload_len: u32) -> Result<()> {
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(SieveError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = (&header[1..]).get_u32();
    check_payload_len(payload_len)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len as usize];
    message[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut message[HEADER_SIZE..])?;

    Ok(message)
}

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    decode_command(&read_frame(reader)?)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    decode_response(&read_frame(reader)?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}
