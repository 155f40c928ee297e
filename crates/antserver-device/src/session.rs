//! Device session lifecycle.
//!
//! A [`DeviceSession`] owns at most one Transport/Framer pair. The pair is
//! rebuilt on every [`DeviceSession::open`] and released on
//! [`DeviceSession::close`] or drop, framer first.
//!
//! ```text
//!  Uninitialized ──open──▶ Opening ──ok──▶ Open ──close──▶ Closed
//!        ▲                    │              │                │
//!        └──────failure───────┘              └──open (rebuild)┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::constants::ANT_STANDARD_DATA_PAYLOAD_SIZE;
use crate::driver::{DeviceDriver, Framer, MessageSink, Transport};
use crate::error::{DeviceError, DeviceResult};

// ============================================================================
// Types
// ============================================================================

/// ANT channel type requested on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// No channel type chosen yet.
    Invalid,
    /// Master (transmitting) channel.
    Master,
    /// Slave (receiving) channel.
    Slave,
}

impl ChannelType {
    /// Map a protocol code (0 = master, 1 = slave) to a channel type.
    pub fn from_code(code: u8) -> ChannelType {
        match code {
            0 => ChannelType::Master,
            1 => ChannelType::Slave,
            _ => ChannelType::Invalid,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handles exist.
    Uninitialized,
    /// Handles are being built; only observable from inside `open`.
    Opening,
    /// Handles exist and the transport is open.
    Open,
    /// The device was closed and its handles released.
    Closed,
}

/// The live Transport/Framer pair.
///
/// Field order matters: the framer is dropped before the transport.
struct DeviceHandles {
    framer: Arc<dyn Framer>,
    transport: Arc<dyn Transport>,
}

impl DeviceHandles {
    fn release(self) {
        self.transport.close();
        let DeviceHandles { framer, transport } = self;
        drop(framer);
        drop(transport);
    }
}

struct SessionInner {
    state: SessionState,
    channel_type: ChannelType,
    handles: Option<DeviceHandles>,
    transmit_buffer: [u8; ANT_STANDARD_DATA_PAYLOAD_SIZE],
}

// ============================================================================
// Completion signalling
// ============================================================================

#[derive(Debug, Default)]
struct CompletionState {
    /// Inbound messages seen since the session was created.
    events: u64,
    /// Bumped on every open so waiters from an earlier session wake up.
    generation: u64,
    /// Set when the session is closed or torn down.
    done: bool,
}

/// Mutex/condvar pair signalled by the device callback.
///
/// The command loop never blocks on it; it exists for callers that want to
/// wait for the device to answer.
#[derive(Debug, Default)]
pub struct Completion {
    state: Mutex<CompletionState>,
    cond: Condvar,
}

impl Completion {
    fn reset(&self) {
        let mut state = self.state.lock();
        state.done = false;
        state.generation += 1;
        self.cond.notify_all();
    }

    fn signal(&self) {
        self.state.lock().events += 1;
        self.cond.notify_all();
    }

    fn finish(&self) {
        self.state.lock().done = true;
        self.cond.notify_all();
    }

    /// Block until an inbound message arrives, the session is closed or
    /// reopened, or `timeout` elapses. Returns `true` only for a new message.
    ///
    /// A timeout too large to represent as a deadline waits without one.
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        let seen = state.events;
        let generation = state.generation;

        while state.events == seen && !state.done && state.generation == generation {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
        state.events != seen
    }

    /// Number of inbound messages signalled so far.
    pub fn event_count(&self) -> u64 {
        self.state.lock().events
    }

    /// Whether the session has been closed since the last open.
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }
}

/// Sink handed to every framer: signals the completion pair, then forwards.
struct SessionSink {
    completion: Arc<Completion>,
    display: Arc<AtomicBool>,
    downstream: Arc<dyn MessageSink>,
}

impl MessageSink for SessionSink {
    fn on_message(&self, frame: &[u8]) {
        if self.display.load(Ordering::Relaxed) {
            log::debug!("Device message {:02X?}", frame);
        }
        self.downstream.on_message(frame);
        self.completion.signal();
    }
}

// ============================================================================
// Session
// ============================================================================

/// The process's connection to one ANT device.
pub struct DeviceSession {
    driver: Box<dyn DeviceDriver>,
    baud_rate: u32,
    inner: Mutex<SessionInner>,
    completion: Arc<Completion>,
    display: Arc<AtomicBool>,
    sink: Arc<dyn MessageSink>,
}

impl DeviceSession {
    /// Create a session in the `Uninitialized` state.
    ///
    /// Inbound frames from any future device handles are delivered to `sink`.
    pub fn new(driver: Box<dyn DeviceDriver>, baud_rate: u32, sink: Arc<dyn MessageSink>) -> Self {
        let completion = Arc::new(Completion::default());
        let display = Arc::new(AtomicBool::new(true));
        let sink: Arc<dyn MessageSink> = Arc::new(SessionSink {
            completion: completion.clone(),
            display: display.clone(),
            downstream: sink,
        });

        DeviceSession {
            driver,
            baud_rate,
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                channel_type: ChannelType::Invalid,
                handles: None,
                transmit_buffer: [0u8; ANT_STANDARD_DATA_PAYLOAD_SIZE],
            }),
            completion,
            display,
            sink,
        }
    }

    /// Open the device at USB index `device_number`.
    ///
    /// Any previous handles are closed and released first. On failure the
    /// session is left `Uninitialized` with no handles.
    pub fn open(&self, device_number: u8, channel_type: ChannelType) -> DeviceResult<()> {
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.handles.take() {
            log::debug!("Releasing previous device handles before reopening");
            previous.release();
        }
        self.completion.reset();

        inner.state = SessionState::Opening;
        inner.channel_type = channel_type;
        inner.transmit_buffer = [0u8; ANT_STANDARD_DATA_PAYLOAD_SIZE];

        match self.build_handles(device_number) {
            Ok(handles) => {
                inner.handles = Some(handles);
                inner.state = SessionState::Open;
                log::info!(
                    "Opened ANT device {} as {:?} at {} baud",
                    device_number,
                    channel_type,
                    self.baud_rate
                );
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Uninitialized;
                inner.channel_type = ChannelType::Invalid;
                log::warn!("Failed to open ANT device {}: {}", device_number, e);
                Err(e)
            }
        }
    }

    fn build_handles(&self, device_number: u8) -> DeviceResult<DeviceHandles> {
        let transport = self.driver.create_transport().map_err(init_failed)?;
        transport
            .init(self.baud_rate, device_number)
            .map_err(init_failed)?;

        let framer = self
            .driver
            .create_framer(transport.clone(), self.sink.clone())
            .map_err(init_failed)?;
        framer.init().map_err(init_failed)?;

        transport.set_callback(Arc::downgrade(&framer));

        if let Err(e) = transport.open() {
            // Nothing else will release them; the pair is dropped here
            DeviceHandles { framer, transport }.release();
            return Err(match e {
                DeviceError::OpenFailed(_) => e,
                other => DeviceError::OpenFailed(other.to_string()),
            });
        }

        Ok(DeviceHandles { framer, transport })
    }

    /// Close the device and release its handles.
    ///
    /// Does nothing if no device is open.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if let Some(handles) = inner.handles.take() {
            handles.release();
            inner.state = SessionState::Closed;
            self.completion.finish();
            log::info!("Closed ANT device");
        }
    }

    /// Frame and send a message body (`[msg_id, data...]`).
    pub fn write_message(&self, message: &[u8]) -> DeviceResult<()> {
        let framer = {
            let inner = self.inner.lock();
            match &inner.handles {
                Some(handles) => handles.framer.clone(),
                None => return Err(DeviceError::NotOpen),
            }
        };
        framer.write_message(message)
    }

    /// Whether a device is open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().handles.is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Channel type of the current (or last attempted) open.
    pub fn channel_type(&self) -> ChannelType {
        self.inner.lock().channel_type
    }

    /// Copy of the transmit buffer.
    pub fn transmit_buffer(&self) -> [u8; ANT_STANDARD_DATA_PAYLOAD_SIZE] {
        self.inner.lock().transmit_buffer
    }

    /// Baud rate used for every open.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Enable or disable debug logging of inbound device messages.
    pub fn set_display(&self, display: bool) {
        self.display.store(display, Ordering::Relaxed);
    }

    /// Whether inbound device messages are logged.
    pub fn display(&self) -> bool {
        self.display.load(Ordering::Relaxed)
    }

    /// The completion pair signalled by inbound messages.
    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    /// Wait for an inbound message. See [`Completion::wait_for_event`].
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        self.completion.wait_for_event(timeout)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(handles) = self.inner.get_mut().handles.take() {
            handles.release();
        }
        self.completion.finish();
    }
}

fn init_failed(e: DeviceError) -> DeviceError {
    match e {
        DeviceError::InitFailed(_) => e,
        other => DeviceError::InitFailed(other.to_string()),
    }
}
