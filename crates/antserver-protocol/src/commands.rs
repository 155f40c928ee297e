//! Commands sent by the host process to the bridge.
//!
//! The bridge understands three verbs:
//! - `request/<id>/open/<deviceNumber>[/<channelType>]` and `request/<id>/close`
//! - `message/<hexPayload>`
//! - `ping/<token>`

use crate::error::{ProtocolError, ProtocolResult};
use crate::hex;
use crate::tokens::split_tokens;

/// Verb token for requests.
pub const VERB_REQUEST: &str = "request";
/// Verb token for outbound device messages.
pub const VERB_MESSAGE: &str = "message";
/// Verb token for the host's keepalive.
pub const VERB_PING: &str = "ping";

/// Channel type code for a master channel.
pub const CHANNEL_TYPE_MASTER: u8 = 0;
/// Channel type code for a slave channel.
pub const CHANNEL_TYPE_SLAVE: u8 = 1;

/// A request that expects a `response/<id>/...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Open the USB device with the given index.
    Open {
        /// USB device index, starting at 0.
        device_number: u8,
        /// Channel type code, [`CHANNEL_TYPE_MASTER`] when the slot is absent.
        channel_type: u8,
    },

    /// Close the device.
    Close,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A request carrying an opaque id that is echoed back in the response.
    Request {
        /// Client-chosen request id.
        id: String,
        /// The request itself.
        request: Request,
    },

    /// A message body to forward to the device.
    ///
    /// The payload stays as text; see [`Command::decode_payload`].
    Message {
        /// Hex-encoded message body.
        payload: String,
    },

    /// Keepalive from the host. Carries no semantics beyond the debug echo.
    Ping {
        /// Whatever followed the verb (the host sends a timestamp).
        token: String,
    },
}

impl Command {
    /// Parse a command from a single input line (without the line terminator).
    ///
    /// Tokens beyond those a verb needs are ignored.
    pub fn parse(line: &str) -> ProtocolResult<Command> {
        let tokens = split_tokens(line);

        match tokens[0] {
            VERB_REQUEST => {
                if tokens.len() < 3 {
                    return Err(ProtocolError::MalformedCommand(format!(
                        "request needs an id and a verb, got {} token(s)",
                        tokens.len()
                    )));
                }
                let id = tokens[1].to_string();
                let request = match tokens[2] {
                    "open" => {
                        let device_number = parse_device_number(&id, tokens.get(3).copied())?;
                        let channel_type = parse_channel_type(&id, tokens.get(4).copied())?;
                        Request::Open {
                            device_number,
                            channel_type,
                        }
                    }
                    "close" => Request::Close,
                    other => {
                        return Err(ProtocolError::MalformedCommand(format!(
                            "unknown request verb: {:?}",
                            other
                        )))
                    }
                };
                Ok(Command::Request { id, request })
            }
            VERB_MESSAGE => match tokens.get(1) {
                Some(payload) => Ok(Command::Message {
                    payload: payload.to_string(),
                }),
                None => Err(ProtocolError::MalformedCommand(
                    "message without payload".to_string(),
                )),
            },
            VERB_PING => Ok(Command::Ping {
                token: tokens.get(1).copied().unwrap_or_default().to_string(),
            }),
            other => Err(ProtocolError::MalformedCommand(format!(
                "unknown verb: {:?}",
                other
            ))),
        }
    }

    /// Decode the hex payload of a [`Command::Message`].
    ///
    /// Returns `None` for other commands.
    pub fn decode_payload(&self) -> Option<ProtocolResult<Vec<u8>>> {
        match self {
            Command::Message { payload } => Some(hex::decode(payload)),
            _ => None,
        }
    }

    /// Format the command as a protocol line, without terminator.
    pub fn to_line(&self) -> String {
        match self {
            Command::Request { id, request } => match request {
                Request::Open {
                    device_number,
                    channel_type,
                } => {
                    if *channel_type == CHANNEL_TYPE_MASTER {
                        format!("{}/{}/open/{}", VERB_REQUEST, id, device_number)
                    } else {
                        format!(
                            "{}/{}/open/{}/{}",
                            VERB_REQUEST, id, device_number, channel_type
                        )
                    }
                }
                Request::Close => format!("{}/{}/close", VERB_REQUEST, id),
            },
            Command::Message { payload } => format!("{}/{}", VERB_MESSAGE, payload),
            Command::Ping { token } => format!("{}/{}", VERB_PING, token),
        }
    }
}

fn parse_device_number(id: &str, token: Option<&str>) -> ProtocolResult<u8> {
    let token = token.unwrap_or_default();
    token
        .parse::<u8>()
        .map_err(|_| ProtocolError::MalformedArgument {
            id: id.to_string(),
            name: "deviceNumber",
            value: token.to_string(),
        })
}

fn parse_channel_type(id: &str, token: Option<&str>) -> ProtocolResult<u8> {
    match token {
        None => Ok(CHANNEL_TYPE_MASTER),
        Some(t) => match t.parse::<u8>() {
            Ok(code @ (CHANNEL_TYPE_MASTER | CHANNEL_TYPE_SLAVE)) => Ok(code),
            _ => Err(ProtocolError::MalformedArgument {
                id: id.to_string(),
                name: "channelType",
                value: t.to_string(),
            }),
        },
    }
}
