//! Hex payload codec.
//!
//! `message` lines carry their binary payload as a hexadecimal string. Decoding
//! accepts either case; encoding produces uppercase.

use crate::error::{ProtocolError, ProtocolResult};

/// Decode a hex string into bytes.
///
/// Odd-length input or a non-hex character is rejected with
/// [`ProtocolError::InvalidPayload`].
pub fn decode(text: &str) -> ProtocolResult<Vec<u8>> {
    check_even(text)?;
    ::hex::decode(text).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

/// Decode a hex string into a caller-provided buffer.
///
/// Returns the number of bytes written (`text.len() / 2`). Fails without
/// touching `buf` if the decoded payload would not fit.
pub fn decode_into(text: &str, buf: &mut [u8]) -> ProtocolResult<usize> {
    check_even(text)?;
    let len = text.len() / 2;
    if len > buf.len() {
        return Err(ProtocolError::InvalidPayload(format!(
            "payload of {} bytes exceeds buffer of {} bytes",
            len,
            buf.len()
        )));
    }
    ::hex::decode_to_slice(text, &mut buf[..len])
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    Ok(len)
}

/// Encode bytes as an uppercase hex string.
pub fn encode(bytes: &[u8]) -> String {
    ::hex::encode_upper(bytes)
}

fn check_even(text: &str) -> ProtocolResult<()> {
    if text.len() % 2 != 0 {
        return Err(ProtocolError::InvalidPayload(format!(
            "odd number of hex digits ({})",
            text.len()
        )));
    }
    Ok(())
}
