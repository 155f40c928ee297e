//! ANT+ Bridge Line Protocol
//!
//! This crate provides the types and utilities for the text protocol spoken on
//! the bridge's standard input and output. The host process (typically a
//! Node.js ANT+ library) writes one command per line and reads one response
//! per line.
//!
//! # Protocol Overview
//!
//! Every line is a sequence of tokens separated by `/`:
//!
//! - **Requests** (host → bridge): `request/<id>/<verb>/<args...>`, answered
//!   with `response/<id>/<result>`
//! - **Messages** (host → bridge): `message/<hex>`, a raw ANT message body to
//!   forward to the device, fire-and-forget
//! - **Messages** (bridge → host): `message/<HEX>`, a complete frame received
//!   from the device
//! - **Debug echo** (bridge → host): `debug/<line>`, written for every input line
//! - **Errors** (bridge → host): `error/<reason>`
//!
//! # Example
//!
//! ```rust
//! use antserver_protocol::{Command, Request, Response};
//!
//! let command = Command::parse("request/42/open/0")?;
//! assert!(matches!(
//!     command,
//!     Command::Request { request: Request::Open { device_number: 0, .. }, .. }
//! ));
//!
//! let reply = Response::Opened { id: "42".to_string(), opened: true };
//! assert_eq!(reply.to_line(), "response/42/true");
//! # Ok::<(), antserver_protocol::ProtocolError>(())
//! ```

mod commands;
mod error;
pub mod hex;
mod responses;
mod tokens;

pub use commands::*;
pub use error::*;
pub use responses::*;
pub use tokens::*;
