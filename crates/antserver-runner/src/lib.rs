//! Command loop of the ANT+ bridge.
//!
//! Reads protocol lines from an input stream, drives a
//! [`antserver_device::DeviceSession`], and writes responses and inbound
//! device messages through a shared [`OutputWriter`].

pub mod config;
pub mod dispatcher;
pub mod output;

pub use config::{init_logging, BridgeConfig};
pub use dispatcher::{DispatchError, Dispatcher};
pub use output::OutputWriter;
