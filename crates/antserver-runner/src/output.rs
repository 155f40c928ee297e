//! Line output shared between the command loop and the device reader thread.

use std::io::{self, Write};
use std::sync::Arc;

use antserver_device::MessageSink;
use antserver_protocol::Response;
use parking_lot::Mutex;

/// Thread-safe line writer. Each line is written and flushed under one lock,
/// so lines from different threads never interleave. Clones share the stream.
#[derive(Clone)]
pub struct OutputWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl OutputWriter {
    /// Wrap any writer.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        OutputWriter {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writer on the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write one line and flush.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self.inner.lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }

    /// Write a response line.
    pub fn send(&self, response: &Response) -> io::Result<()> {
        self.write_line(&response.to_line())
    }
}

impl MessageSink for OutputWriter {
    fn on_message(&self, frame: &[u8]) {
        if let Err(e) = self.send(&Response::Message(frame.to_vec())) {
            log::warn!("Failed to forward device message: {}", e);
        }
    }
}
