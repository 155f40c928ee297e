//! Lines written by the bridge to the host process.

use std::str::FromStr;

use crate::error::{ProtocolError, ProtocolResult};
use crate::hex;
use crate::tokens::split_tokens;

/// Reason token of an `error/<reason>` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    /// A `message` arrived while no device is open.
    ChannelNotOpened,
    /// The `message` payload was not valid hex or too long.
    InvalidPayload,
    /// The device rejected the outbound message.
    WriteFailed,
    /// Unknown verb or missing tokens.
    MalformedRequest,
}

impl ErrorReason {
    /// Get the reason token.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::ChannelNotOpened => "channel_not_opened",
            ErrorReason::InvalidPayload => "invalid_payload",
            ErrorReason::WriteFailed => "write_failed",
            ErrorReason::MalformedRequest => "malformed_request",
        }
    }

}

impl FromStr for ErrorReason {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel_not_opened" => Ok(ErrorReason::ChannelNotOpened),
            "invalid_payload" => Ok(ErrorReason::InvalidPayload),
            "write_failed" => Ok(ErrorReason::WriteFailed),
            "malformed_request" => Ok(ErrorReason::MalformedRequest),
            _ => Err(ProtocolError::MalformedCommand(format!("unknown error reason: {:?}", s))),
        }
    }
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Echo of an input line, written before the line is processed.
    Debug(String),

    /// Reply to `open`.
    Opened {
        /// Request id.
        id: String,
        /// Whether the device is now open.
        opened: bool,
    },

    /// Reply to `close`. The result field is empty.
    Closed {
        /// Request id.
        id: String,
    },

    /// A complete frame received from the device.
    Message(Vec<u8>),

    /// A command failed.
    Error(ErrorReason),
}

impl Response {
    /// Format the response as a protocol line, without terminator.
    pub fn to_line(&self) -> String {
        match self {
            Response::Debug(line) => format!("debug/{}", line),
            Response::Opened { id, opened } => format!("response/{}/{}", id, opened),
            Response::Closed { id } => format!("response/{}/", id),
            Response::Message(data) => format!("message/{}", hex::encode(data)),
            Response::Error(reason) => format!("error/{}", reason.as_str()),
        }
    }

    /// Parse an output line.
    ///
    /// This is the host's side of the protocol; the bridge only writes lines.
    /// `response` lines with an empty result are read as [`Response::Closed`].
    pub fn parse(line: &str) -> ProtocolResult<Response> {
        if let Some(echo) = line.strip_prefix("debug/") {
            return Ok(Response::Debug(echo.to_string()));
        }

        let tokens = split_tokens(line);
        match (tokens[0], tokens.len()) {
            ("response", 3) => {
                let id = tokens[1].to_string();
                match tokens[2] {
                    "" => Ok(Response::Closed { id }),
                    "true" => Ok(Response::Opened { id, opened: true }),
                    "false" => Ok(Response::Opened { id, opened: false }),
                    other => Err(ProtocolError::MalformedCommand(format!(
                        "unknown response result: {:?}",
                        other
                    ))),
                }
            }
            ("message", 2) => Ok(Response::Message(hex::decode(tokens[1])?)),
            ("error", 2) => tokens[1].parse().map(Response::Error),
            _ => Err(ProtocolError::MalformedCommand(line.to_string())),
        }
    }
}
