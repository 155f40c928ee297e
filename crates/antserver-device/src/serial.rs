//! Serial port transport for ANT USB sticks.
//!
//! ANT USB sticks present as USB virtual COM ports. [`SerialTransport`] finds
//! the stick by its index among attached Dynastream devices (or uses an
//! explicitly configured port), and runs a reader thread that feeds inbound
//! bytes to the registered [`Framer`].

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortType};

use crate::constants::DYNASTREAM_VID;
use crate::driver::{DeviceDriver, Framer, MessageSink, Transport};
use crate::error::{DeviceError, DeviceResult};
use crate::framer::AntFramer;

/// Serial transport configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Explicit port path. When `None`, the port is looked up by device index.
    pub port: Option<String>,
    /// Read timeout of the reader thread; bounds how long `close` waits.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: None,
            read_timeout: Duration::from_millis(50),
        }
    }
}

/// Find the port name of the `device_number`-th ANT USB stick.
///
/// Sticks are ordered by port name so the index is stable across calls.
pub fn find_ant_port(device_number: u8) -> DeviceResult<String> {
    let ports = serialport::available_ports()?;

    let mut names: Vec<String> = ports
        .into_iter()
        .filter(|p| matches!(&p.port_type, SerialPortType::UsbPort(info) if info.vid == DYNASTREAM_VID))
        .map(|p| p.port_name)
        .collect();
    names.sort();

    log::debug!("ANT USB ports: {:?}", names);

    names
        .into_iter()
        .nth(device_number as usize)
        .ok_or(DeviceError::PortNotFound { device_number })
}

/// Reader thread handle.
struct Reader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SerialState {
    port_name: Option<String>,
    baud_rate: u32,
    writer: Option<Box<dyn SerialPort>>,
    reader: Option<Reader>,
}

/// [`Transport`] over a serial port.
pub struct SerialTransport {
    config: SerialConfig,
    state: Mutex<SerialState>,
    callback: Arc<Mutex<Option<Weak<dyn Framer>>>>,
}

impl SerialTransport {
    /// Create an uninitialized transport.
    pub fn new(config: SerialConfig) -> Self {
        SerialTransport {
            config,
            state: Mutex::new(SerialState::default()),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Name of the resolved port, once initialized.
    pub fn port_name(&self) -> Option<String> {
        self.state.lock().port_name.clone()
    }

    /// Whether the port is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().writer.is_some()
    }
}

fn run_reader(
    mut port: Box<dyn SerialPort>,
    stop: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<Weak<dyn Framer>>>>,
) {
    let mut buf = [0u8; 256];
    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                let framer = callback.lock().as_ref().and_then(Weak::upgrade);
                match framer {
                    Some(framer) => framer.on_bytes(&buf[..n]),
                    None => log::trace!("Discarding {} inbound bytes, no framer registered", n),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::Interrupted => {
                continue
            }
            Err(e) => {
                log::warn!("Serial read failed, stopping reader: {}", e);
                break;
            }
        }
    }
    log::debug!("Serial reader stopped");
}

impl Transport for SerialTransport {
    fn init(&self, baud_rate: u32, device_number: u8) -> DeviceResult<()> {
        let port_name = match &self.config.port {
            Some(port) => port.clone(),
            None => find_ant_port(device_number)?,
        };
        log::debug!("Using serial port {} at {} baud", port_name, baud_rate);

        let mut state = self.state.lock();
        state.port_name = Some(port_name);
        state.baud_rate = baud_rate;
        Ok(())
    }

    fn open(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.writer.is_some() {
            return Ok(());
        }
        let port_name = state
            .port_name
            .clone()
            .ok_or_else(|| DeviceError::OpenFailed("transport not initialized".to_string()))?;

        let writer = serialport::new(&port_name, state.baud_rate)
            .timeout(self.config.read_timeout)
            .open()?;
        let reader_port = writer.try_clone()?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            let callback = self.callback.clone();
            thread::Builder::new()
                .name(format!("ant-rx-{}", port_name))
                .spawn(move || run_reader(reader_port, stop, callback))?
        };

        state.writer = Some(writer);
        state.reader = Some(Reader { stop, handle });
        log::debug!("Opened serial port {}", port_name);
        Ok(())
    }

    fn close(&self) {
        let (writer, reader) = {
            let mut state = self.state.lock();
            (state.writer.take(), state.reader.take())
        };
        if let Some(reader) = reader {
            reader.stop.store(true, Ordering::Relaxed);
            if reader.handle.join().is_err() {
                log::warn!("Serial reader thread panicked");
            }
        }
        if writer.is_some() {
            log::debug!("Closed serial port {:?}", self.port_name());
        }
    }

    fn write_bytes(&self, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        let writer = state.writer.as_mut().ok_or(DeviceError::NotOpen)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn set_callback(&self, framer: Weak<dyn Framer>) {
        *self.callback.lock() = Some(framer);
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Production [`DeviceDriver`]: serial transport with ANT framing.
#[derive(Debug, Clone, Default)]
pub struct SerialDriver {
    config: SerialConfig,
}

impl SerialDriver {
    /// Create a driver building transports from `config`.
    pub fn new(config: SerialConfig) -> Self {
        SerialDriver { config }
    }
}

impl DeviceDriver for SerialDriver {
    fn create_transport(&self) -> DeviceResult<Arc<dyn Transport>> {
        Ok(Arc::new(SerialTransport::new(self.config.clone())))
    }

    fn create_framer(
        &self,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn MessageSink>,
    ) -> DeviceResult<Arc<dyn Framer>> {
        Ok(Arc::new(AntFramer::new(transport, sink)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_transport_refuses_open() {
        let transport = SerialTransport::new(SerialConfig::default());
        assert!(matches!(transport.open(), Err(DeviceError::OpenFailed(_))));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_write_without_open() {
        let transport = SerialTransport::new(SerialConfig::default());
        assert!(matches!(transport.write_bytes(&[0xA4]), Err(DeviceError::NotOpen)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let transport = SerialTransport::new(SerialConfig::default());
        transport.close();
        transport.close();
        assert!(!transport.is_open());
    }

    #[test]
    fn test_init_uses_configured_port() {
        let transport = SerialTransport::new(SerialConfig {
            port: Some("/dev/ttyANT0".to_string()),
            ..Default::default()
        });
        transport.init(57_600, 3).unwrap();
        assert_eq!(transport.port_name().as_deref(), Some("/dev/ttyANT0"));
    }
}
