//! Scriptable driver for tests.
//!
//! [`MockDriver`] builds [`MockTransport`]s paired with a real
//! [`AntFramer`], records what the session does with them, and can be told
//! to fail at each lifecycle step.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::driver::{DeviceDriver, Framer, MessageSink, Transport};
use crate::error::{DeviceError, DeviceResult};
use crate::framer::AntFramer;

/// Counters and captured data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Transports constructed.
    pub transports_created: usize,
    /// Transports dropped.
    pub transports_dropped: usize,
    /// Framers constructed.
    pub framers_created: usize,
    /// `(baud_rate, device_number)` of every transport `init`.
    pub inits: Vec<(u32, u8)>,
    /// Transport `open` calls, successful or not.
    pub opens: usize,
    /// Transport `close` calls.
    pub closes: usize,
    /// Raw bytes written, one entry per `write_bytes`.
    pub written: Vec<Vec<u8>>,
}

/// Which steps should fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockFailures {
    /// Transport `init` returns an error.
    pub transport_init: bool,
    /// Framer construction returns an error.
    pub framer_create: bool,
    /// Transport `open` returns an error.
    pub open: bool,
    /// Transport `write_bytes` returns an error.
    pub write: bool,
    /// Transport `write_bytes` panics.
    pub write_panics: bool,
}

#[derive(Default)]
struct Shared {
    stats: Mutex<MockStats>,
    failures: Mutex<MockFailures>,
    current: Mutex<Option<Weak<MockTransport>>>,
}

/// Transport that talks to nothing.
pub struct MockTransport {
    shared: Arc<Shared>,
    callback: Mutex<Option<Weak<dyn Framer>>>,
}

impl MockTransport {
    /// Feed bytes to the registered framer as if the device sent them.
    ///
    /// Returns `false` if no live framer is registered.
    pub fn inject_rx(&self, data: &[u8]) -> bool {
        let framer = self.callback.lock().as_ref().and_then(Weak::upgrade);
        match framer {
            Some(framer) => {
                framer.on_bytes(data);
                true
            }
            None => false,
        }
    }
}

impl Transport for MockTransport {
    fn init(&self, baud_rate: u32, device_number: u8) -> DeviceResult<()> {
        self.shared.stats.lock().inits.push((baud_rate, device_number));
        if self.shared.failures.lock().transport_init {
            return Err(DeviceError::PortNotFound { device_number });
        }
        Ok(())
    }

    fn open(&self) -> DeviceResult<()> {
        self.shared.stats.lock().opens += 1;
        if self.shared.failures.lock().open {
            return Err(DeviceError::OpenFailed("mock device busy".to_string()));
        }
        Ok(())
    }

    fn close(&self) {
        self.shared.stats.lock().closes += 1;
    }

    fn write_bytes(&self, data: &[u8]) -> DeviceResult<()> {
        let failures = *self.shared.failures.lock();
        if failures.write_panics {
            panic!("mock transport panicked writing {} bytes", data.len());
        }
        if failures.write {
            return Err(DeviceError::WriteFailed("mock write failure".to_string()));
        }
        self.shared.stats.lock().written.push(data.to_vec());
        Ok(())
    }

    fn set_callback(&self, framer: Weak<dyn Framer>) {
        *self.callback.lock() = Some(framer);
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.shared.stats.lock().transports_dropped += 1;
    }
}

/// [`DeviceDriver`] producing [`MockTransport`]s. Clones share state.
#[derive(Clone, Default)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

impl MockDriver {
    /// Create a driver where every step succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded stats.
    pub fn stats(&self) -> MockStats {
        self.shared.stats.lock().clone()
    }

    /// Replace the failure script.
    pub fn set_failures(&self, failures: MockFailures) {
        *self.shared.failures.lock() = failures;
    }

    /// The most recently created transport, if still alive.
    pub fn current_transport(&self) -> Option<Arc<MockTransport>> {
        self.shared.current.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Inject inbound bytes into the most recently created transport.
    pub fn inject_rx(&self, data: &[u8]) -> bool {
        self.current_transport()
            .map(|t| t.inject_rx(data))
            .unwrap_or(false)
    }
}

impl DeviceDriver for MockDriver {
    fn create_transport(&self) -> DeviceResult<Arc<dyn Transport>> {
        let transport = Arc::new(MockTransport {
            shared: self.shared.clone(),
            callback: Mutex::new(None),
        });
        *self.shared.current.lock() = Some(Arc::downgrade(&transport));
        self.shared.stats.lock().transports_created += 1;
        Ok(transport)
    }

    fn create_framer(
        &self,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn MessageSink>,
    ) -> DeviceResult<Arc<dyn Framer>> {
        if self.shared.failures.lock().framer_create {
            return Err(DeviceError::InitFailed("mock framer unavailable".to_string()));
        }
        self.shared.stats.lock().framers_created += 1;
        Ok(Arc::new(AntFramer::new(transport, sink)))
    }
}

/// [`MessageSink`] that keeps every frame.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    /// Frames received so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }
}

impl MessageSink for RecordingSink {
    fn on_message(&self, frame: &[u8]) {
        self.frames.lock().push(frame.to_vec());
    }
}
