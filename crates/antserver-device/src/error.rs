//! Error types for device operations.

use thiserror::Error;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors that can occur while driving the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Transport or framer could not be constructed or initialized.
    #[error("device initialization failed: {0}")]
    InitFailed(String),

    /// The transport was initialized but refused to open.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// No device session is open.
    #[error("device session is not open")]
    NotOpen,

    /// An outbound message could not be written.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// No ANT USB stick exists at the requested index.
    #[error("no ANT USB device at index {device_number}")]
    PortNotFound {
        /// Requested USB device index.
        device_number: u8,
    },

    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error on the serial link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
