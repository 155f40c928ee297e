//! ANT frame encoding/decoding.
//!
//! Every ANT message travels in a frame made of a sync byte, the data length,
//! the message id, the data and an XOR checksum over everything before it.
//!
//! ```text
//! +------+-----+--------+----------------+----------+
//! | 0xA4 | len | msg_id | data[0..len]   | checksum |
//! +------+-----+--------+----------------+----------+
//! ```

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;

use crate::constants::{
    FRAME_OVERHEAD, MAX_FRAME_SIZE, MAX_MESSAGE_BODY_SIZE, MAX_MESSAGE_DATA_SIZE, MESSAGE_TX_SYNC,
};
use crate::driver::{Framer, MessageSink, Transport};
use crate::error::{DeviceError, DeviceResult};

/// XOR checksum over a byte slice.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Drop a trailing frame checksum from a message body.
///
/// Hosts build complete frames and send them without the sync and length
/// bytes, so `payload` is either `[msg_id, data...]` or
/// `[msg_id, data..., checksum]`. The last byte is removed only when it is the
/// checksum of the frame the rest of the payload would form.
pub fn strip_checksum(payload: &[u8]) -> &[u8] {
    let Some((&last, body)) = payload.split_last() else {
        return payload;
    };
    if body.is_empty() || body.len() > MAX_MESSAGE_BODY_SIZE {
        return payload;
    }
    let header = [MESSAGE_TX_SYNC, (body.len() - 1) as u8];
    if checksum(&header) ^ checksum(body) == last {
        body
    } else {
        payload
    }
}

/// A codec for reading and writing ANT frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE * 4),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete frame from the buffer.
    ///
    /// Returns the whole frame, sync byte through checksum. Bytes before a
    /// sync byte are discarded; a frame with an impossible length or a bad
    /// checksum costs one byte and the scan resumes after its sync byte.
    pub fn decode(&mut self) -> Option<Vec<u8>> {
        loop {
            // Scan for the sync byte, discarding any preceding garbage
            while !self.buffer.is_empty() && self.buffer[0] != MESSAGE_TX_SYNC {
                self.buffer.advance(1);
            }

            if self.buffer.len() < 2 {
                return None;
            }

            let len = self.buffer[1] as usize;
            if len > MAX_MESSAGE_DATA_SIZE {
                log::debug!("Dropping sync byte with impossible length {}", len);
                self.buffer.advance(1);
                continue;
            }

            let total = len + FRAME_OVERHEAD;
            if self.buffer.len() < total {
                return None;
            }

            let expected = checksum(&self.buffer[..total - 1]);
            if self.buffer[total - 1] != expected {
                log::warn!(
                    "Dropping ANT frame with bad checksum (got 0x{:02X}, expected 0x{:02X})",
                    self.buffer[total - 1],
                    expected
                );
                self.buffer.advance(1);
                continue;
            }

            return Some(self.buffer.split_to(total).to_vec());
        }
    }

    /// Encode a message body (`[msg_id, data...]`) into a frame.
    pub fn encode(message: &[u8]) -> DeviceResult<Vec<u8>> {
        if message.is_empty() {
            return Err(DeviceError::WriteFailed("empty message".to_string()));
        }
        let data_len = message.len() - 1;
        if data_len > MAX_MESSAGE_DATA_SIZE {
            return Err(DeviceError::WriteFailed(format!(
                "message data of {} bytes exceeds maximum of {}",
                data_len, MAX_MESSAGE_DATA_SIZE
            )));
        }

        let mut frame = Vec::with_capacity(message.len() + FRAME_OVERHEAD - 1);
        frame.push(MESSAGE_TX_SYNC);
        frame.push(data_len as u8);
        frame.extend_from_slice(message);
        frame.push(checksum(&frame));
        Ok(frame)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// [`Framer`] speaking the ANT serial framing over any [`Transport`].
pub struct AntFramer {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn MessageSink>,
    codec: Mutex<FrameCodec>,
}

impl AntFramer {
    /// Create a framer bound to `transport`, delivering inbound frames to `sink`.
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn MessageSink>) -> Self {
        AntFramer {
            transport,
            sink,
            codec: Mutex::new(FrameCodec::new()),
        }
    }
}

impl Framer for AntFramer {
    fn init(&self) -> DeviceResult<()> {
        self.codec.lock().clear();
        Ok(())
    }

    fn write_message(&self, message: &[u8]) -> DeviceResult<()> {
        let frame = FrameCodec::encode(message)?;
        log::trace!("ANT TX {:02X?}", frame);
        self.transport.write_bytes(&frame)
    }

    fn on_bytes(&self, data: &[u8]) {
        // Collect first so the sink runs without the codec lock held
        let frames: Vec<Vec<u8>> = {
            let mut codec = self.codec.lock();
            codec.push(data);
            std::iter::from_fn(|| codec.decode()).collect()
        };
        for frame in frames {
            log::trace!("ANT RX {:02X?}", frame);
            self.sink.on_message(&frame);
        }
    }
}
