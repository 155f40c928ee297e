//! Collaborator contracts.
//!
//! The session only depends on these traits. [`crate::SerialDriver`] provides
//! the production pair (serial port + ANT framing) and
//! `testing::MockDriver` a scriptable one.

use std::sync::{Arc, Weak};

use crate::error::DeviceResult;

/// Byte-level link to the device.
///
/// Methods take `&self`: the transport is shared between the session, the
/// framer writing through it and (for real hardware) a reader thread.
pub trait Transport: Send + Sync {
    /// Configure the link for the given baud rate and USB device index.
    fn init(&self, baud_rate: u32, device_number: u8) -> DeviceResult<()>;

    /// Open the link and start delivering inbound bytes to the callback.
    fn open(&self) -> DeviceResult<()>;

    /// Close the link. Safe to call when not open.
    fn close(&self);

    /// Write raw bytes to the device.
    fn write_bytes(&self, data: &[u8]) -> DeviceResult<()>;

    /// Register the framer that receives inbound bytes.
    ///
    /// Only a weak reference is kept; once the session drops the framer,
    /// inbound bytes are discarded.
    fn set_callback(&self, framer: Weak<dyn Framer>);
}

/// Message framing layer bound to a [`Transport`].
pub trait Framer: Send + Sync {
    /// Prepare the framer for use.
    fn init(&self) -> DeviceResult<()>;

    /// Frame a message body (`[msg_id, data...]`) and write it to the transport.
    fn write_message(&self, message: &[u8]) -> DeviceResult<()>;

    /// Inbound bytes from the transport. Called from the transport's thread.
    fn on_bytes(&self, data: &[u8]);
}

/// Receiver of complete inbound frames.
pub trait MessageSink: Send + Sync {
    /// Called once per complete, checksum-valid frame.
    fn on_message(&self, frame: &[u8]);
}

/// Factory for Transport/Framer pairs.
///
/// A fresh pair is built on every open.
pub trait DeviceDriver: Send + Sync {
    /// Construct a new, uninitialized transport.
    fn create_transport(&self) -> DeviceResult<Arc<dyn Transport>>;

    /// Construct a framer writing through `transport` and delivering inbound
    /// frames to `sink`.
    fn create_framer(
        &self,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn MessageSink>,
    ) -> DeviceResult<Arc<dyn Framer>>;
}
