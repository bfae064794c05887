// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary terminal frame codec.
//!
//! Layout, bit-exact:
//!
//! ```text
//! byte 0        frame kind (0x01 = terminal output)
//! byte 1        session-id length L (0..=255)
//! bytes 2..2+L  session id, UTF-8
//! next 8 bytes  sequence number, u64 big-endian
//! remainder     raw PTY bytes
//! ```
//!
//! Encode and decode are stateless; the hub forwards the raw encoded bytes
//! to subscribers verbatim, so a decode followed by a re-encode must be
//! byte-identical.

/// Frame kind byte for terminal output.
pub const KIND_OUTPUT: u8 = 0x01;

/// Header bytes besides the session id itself: kind + length + sequence.
const HEADER_FIXED: usize = 1 + 1 + 8;

/// Codec failure. Oversize ids are an encode-side programming error; the
/// rest are malformed input on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("session id exceeds 255 bytes")]
    IdTooLong,
    #[error("unknown frame kind {0:#04x}")]
    UnknownKind(u8),
    #[error("frame truncated")]
    Truncated,
    #[error("session id is not valid UTF-8")]
    InvalidId,
}

/// A decoded terminal-output frame borrowing from the wire buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFrame<'a> {
    pub session_id: &'a str,
    pub seq: u64,
    pub payload: &'a [u8],
}

/// Encode a terminal-output frame.
pub fn encode_output(session_id: &str, seq: u64, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let id = session_id.as_bytes();
    if id.len() > u8::MAX as usize {
        return Err(FrameError::IdTooLong);
    }

    let mut buf = Vec::with_capacity(HEADER_FIXED + id.len() + payload.len());
    buf.push(KIND_OUTPUT);
    buf.push(id.len() as u8);
    buf.extend_from_slice(id);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode a terminal-output frame. The payload may be empty.
pub fn decode_output(buf: &[u8]) -> Result<OutputFrame<'_>, FrameError> {
    let (session_id, rest) = split_header(buf)?;
    let (seq_bytes, payload) = rest.split_at(8);
    let mut seq = [0u8; 8];
    seq.copy_from_slice(seq_bytes);
    Ok(OutputFrame { session_id, seq: u64::from_be_bytes(seq), payload })
}

/// Read only the session id from a frame header, without touching the
/// payload. The hub's fan-out path uses this to route raw bytes.
pub fn session_id_of(buf: &[u8]) -> Result<&str, FrameError> {
    split_header(buf).map(|(id, _)| id)
}

/// Validate the fixed header and return `(session_id, seq + payload)`.
fn split_header(buf: &[u8]) -> Result<(&str, &[u8]), FrameError> {
    if buf.len() < 2 {
        return Err(FrameError::Truncated);
    }
    if buf[0] != KIND_OUTPUT {
        return Err(FrameError::UnknownKind(buf[0]));
    }
    let id_len = buf[1] as usize;
    if buf.len() < 2 + id_len + 8 {
        return Err(FrameError::Truncated);
    }
    let session_id = std::str::from_utf8(&buf[2..2 + id_len]).map_err(|_| FrameError::InvalidId)?;
    Ok((session_id, &buf[2 + id_len..]))
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
