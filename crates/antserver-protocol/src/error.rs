//! Error types for the line protocol.

use thiserror::Error;

/// Errors that can occur when parsing a protocol line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line has an unknown verb or too few tokens for its verb.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// A request argument could not be interpreted.
    #[error("malformed argument `{name}` in request {id}: {value:?}")]
    MalformedArgument {
        /// Id of the request the argument belongs to.
        id: String,
        /// Argument name.
        name: &'static str,
        /// Raw token received.
        value: String,
    },

    /// A `message` payload is not an even-length hex string, or does not fit.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
