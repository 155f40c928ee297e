//! Command dispatcher.
//!
//! Every input line is echoed as `debug/<line>`, parsed, and dispatched to the
//! device session. A failing line produces at most one `response/` or
//! `error/` line and never stops the loop.

use std::io::{self, BufRead};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use antserver_device::constants::MAX_MESSAGE_BODY_SIZE;
use antserver_device::framer::strip_checksum;
use antserver_device::{ChannelType, DeviceError, DeviceSession, SerialDriver};
use antserver_protocol::{hex, Command, ErrorReason, ProtocolError, Request, Response};
use thiserror::Error;

use crate::config::BridgeConfig;
use crate::output::OutputWriter;

/// Per-command failures.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The line could not be parsed, or its payload is invalid.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A `message` arrived with no open device.
    #[error("channel not opened")]
    SessionNotOpen,

    /// The device rejected an outbound message.
    #[error("failed to write message: {0}")]
    Write(#[source] DeviceError),
}

impl DispatchError {
    /// The line reported to the host for this failure.
    ///
    /// A malformed `open` argument still answers the request so the host
    /// does not wait on the id forever.
    pub fn to_response(&self) -> Response {
        match self {
            DispatchError::Protocol(ProtocolError::MalformedArgument { id, .. }) => Response::Opened {
                id: id.clone(),
                opened: false,
            },
            DispatchError::Protocol(ProtocolError::MalformedCommand(_)) => {
                Response::Error(ErrorReason::MalformedRequest)
            }
            DispatchError::Protocol(ProtocolError::InvalidPayload(_)) => {
                Response::Error(ErrorReason::InvalidPayload)
            }
            DispatchError::SessionNotOpen => Response::Error(ErrorReason::ChannelNotOpened),
            DispatchError::Write(_) => Response::Error(ErrorReason::WriteFailed),
        }
    }
}

/// Reads commands and drives the device session.
pub struct Dispatcher {
    session: DeviceSession,
    output: OutputWriter,
}

impl Dispatcher {
    /// Create a dispatcher around an existing session.
    ///
    /// The session's message sink should write to the same `output`.
    pub fn new(session: DeviceSession, output: OutputWriter) -> Self {
        Dispatcher { session, output }
    }

    /// Create a dispatcher driving a real ANT stick over serial.
    pub fn from_config(config: &BridgeConfig, output: OutputWriter) -> Self {
        let driver = SerialDriver::new(config.serial_config());
        let session = DeviceSession::new(Box::new(driver), config.baud_rate, Arc::new(output.clone()));
        session.set_display(!config.quiet_messages);
        Self::new(session, output)
    }

    /// The device session.
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Process lines until end of input.
    ///
    /// Only an I/O error on the input or output stream ends the loop early.
    /// Invalid UTF-8 is replaced rather than rejected; `\n` and `\r\n` are
    /// both accepted as terminators.
    pub fn run<R: BufRead>(&self, mut input: R) -> io::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                log::debug!("Input closed");
                return Ok(());
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            let line = String::from_utf8_lossy(&buf);
            self.handle_line(&line)?;
        }
    }

    /// Echo, parse and dispatch a single line.
    pub fn handle_line(&self, line: &str) -> io::Result<()> {
        self.output.send(&Response::Debug(line.to_string()))?;

        let reply = match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(line))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                log::debug!("Command {:?} failed: {}", line, e);
                Some(e.to_response())
            }
            Err(_) => {
                log::error!("Command {:?} panicked, continuing", line);
                None
            }
        };

        match reply {
            Some(response) => self.output.send(&response),
            None => Ok(()),
        }
    }

    /// Run one command and return the line to write, if any.
    pub fn dispatch(&self, line: &str) -> Result<Option<Response>, DispatchError> {
        match Command::parse(line)? {
            Command::Request { id, request } => Ok(Some(self.handle_request(id, request))),
            Command::Message { payload } => {
                self.handle_message(&payload)?;
                Ok(None)
            }
            Command::Ping { .. } => Ok(None),
        }
    }

    fn handle_request(&self, id: String, request: Request) -> Response {
        match request {
            Request::Open {
                device_number,
                channel_type,
            } => {
                let opened = self
                    .session
                    .open(device_number, ChannelType::from_code(channel_type))
                    .is_ok();
                Response::Opened { id, opened }
            }
            Request::Close => {
                self.session.close();
                Response::Closed { id }
            }
        }
    }

    fn handle_message(&self, payload: &str) -> Result<(), DispatchError> {
        if !self.session.is_open() {
            return Err(DispatchError::SessionNotOpen);
        }

        // Room for the message body plus a trailing checksum
        let mut buffer = [0u8; MAX_MESSAGE_BODY_SIZE + 1];
        let len = hex::decode_into(payload, &mut buffer)?;
        let body = strip_checksum(&buffer[..len]);
        if body.is_empty() {
            return Err(ProtocolError::InvalidPayload("empty payload".to_string()).into());
        }
        if body.len() > MAX_MESSAGE_BODY_SIZE {
            return Err(ProtocolError::InvalidPayload(format!(
                "message body of {} bytes exceeds maximum of {}",
                body.len(),
                MAX_MESSAGE_BODY_SIZE
            ))
            .into());
        }

        // Fire-and-forget: nothing is read back from the device here
        self.session.write_message(body).map_err(|e| match e {
            DeviceError::NotOpen => DispatchError::SessionNotOpen,
            other => DispatchError::Write(other),
        })
    }
}
