//! # antserver-device
//!
//! Device side of the ANT+ bridge.
//!
//! The bridge talks to an ANT USB stick through two collaborators:
//!
//! - a [`Transport`] that moves raw bytes over the serial link, and
//! - a [`Framer`] that wraps message bodies into ANT frames on the way out and
//!   reassembles frames from the byte stream on the way in.
//!
//! [`DeviceSession`] owns one Transport/Framer pair at a time and keeps it
//! consistent across repeated open/close cycles. The pair is built through a
//! [`DeviceDriver`], so tests can swap in the mock driver from the `testing`
//! module (feature `testing`).
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use antserver_device::{ChannelType, DeviceSession, MessageSink, SerialConfig, SerialDriver};
//!
//! struct Print;
//! impl MessageSink for Print {
//!     fn on_message(&self, frame: &[u8]) {
//!         println!("{:02X?}", frame);
//!     }
//! }
//!
//! let driver = SerialDriver::new(SerialConfig::default());
//! let session = DeviceSession::new(Box::new(driver), 50_000, Arc::new(Print));
//! session.open(0, ChannelType::Master)?;
//! session.write_message(&[0x4A, 0x00])?; // reset system
//! session.close();
//! # Ok::<(), antserver_device::DeviceError>(())
//! ```

pub mod constants;
mod driver;
mod error;
pub mod framer;
pub mod serial;
mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use driver::*;
pub use error::*;
pub use framer::AntFramer;
pub use serial::{SerialConfig, SerialDriver, SerialTransport};
pub use session::*;
