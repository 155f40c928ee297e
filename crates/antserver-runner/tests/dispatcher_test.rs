//! Integration tests for the command loop against the mock device driver.

use std::io::{self, Cursor, Write};
use std::sync::Arc;

use antserver_device::constants::{DEFAULT_BAUD_RATE, MAX_MESSAGE_BODY_SIZE};
use antserver_device::framer::FrameCodec;
use antserver_device::testing::{MockDriver, MockFailures};
use antserver_device::{ChannelType, DeviceSession, SessionState};
use antserver_protocol::{hex, ErrorReason, Response};
use antserver_runner::{Dispatcher, OutputWriter};
use parking_lot::Mutex;

/// Startup notification a stick sends after reset.
const STARTUP_FRAME: [u8; 5] = [0xA4, 0x01, 0x6F, 0x00, 0xCA];

// ============================================================================
// Harness
// ============================================================================

/// In-memory output stream shared with the dispatcher.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    dispatcher: Dispatcher,
    driver: MockDriver,
    buffer: SharedBuffer,
}

impl Harness {
    fn new() -> Self {
        let buffer = SharedBuffer::default();
        let output = OutputWriter::new(buffer.clone());
        let driver = MockDriver::new();
        let session = DeviceSession::new(
            Box::new(driver.clone()),
            DEFAULT_BAUD_RATE,
            Arc::new(output.clone()),
        );
        Harness {
            dispatcher: Dispatcher::new(session, output),
            driver,
            buffer,
        }
    }

    /// All output lines so far.
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.buffer.0.lock().clone())
            .expect("output is UTF-8")
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Handle one line and return the output it produced.
    fn send(&self, line: &str) -> Vec<String> {
        let before = self.lines().len();
        self.dispatcher.handle_line(line).expect("output never fails");
        self.lines().split_off(before)
    }
}

fn debug(line: &str) -> String {
    format!("debug/{}", line)
}

// ============================================================================
// Request Tests
// ============================================================================

#[test]
fn test_open_success() {
    let h = Harness::new();
    assert_eq!(
        h.send("request/42/open/0"),
        vec![debug("request/42/open/0"), "response/42/true".to_string()]
    );

    let stats = h.driver.stats();
    assert_eq!(stats.inits, vec![(DEFAULT_BAUD_RATE, 0)]);
    assert_eq!(stats.opens, 1);
    assert_eq!(h.dispatcher.session().state(), SessionState::Open);
    assert_eq!(h.dispatcher.session().channel_type(), ChannelType::Master);
}

#[test]
fn test_open_with_channel_type_slot() {
    let h = Harness::new();
    assert_eq!(h.send("request/5/open/1/1")[1], "response/5/true");
    assert_eq!(h.dispatcher.session().channel_type(), ChannelType::Slave);
    assert_eq!(h.driver.stats().inits, vec![(DEFAULT_BAUD_RATE, 1)]);
}

#[test]
fn test_open_init_failure_keeps_serving() {
    let h = Harness::new();
    h.driver.set_failures(MockFailures {
        transport_init: true,
        ..Default::default()
    });

    assert_eq!(
        h.send("request/7/open/0"),
        vec![debug("request/7/open/0"), "response/7/false".to_string()]
    );
    assert_eq!(
        h.send("message/4A00"),
        vec![debug("message/4A00"), "error/channel_not_opened".to_string()]
    );

    h.driver.set_failures(MockFailures::default());
    assert_eq!(h.send("request/8/open/0")[1], "response/8/true");
    assert_eq!(h.send("message/4A00"), vec![debug("message/4A00")]);
}

#[test]
fn test_open_failure_releases_handles() {
    let h = Harness::new();
    h.driver.set_failures(MockFailures {
        open: true,
        ..Default::default()
    });

    assert_eq!(h.send("request/1/open/0")[1], "response/1/false");
    let stats = h.driver.stats();
    assert_eq!(stats.transports_created, 1);
    assert_eq!(stats.transports_dropped, 1);
    assert_eq!(h.dispatcher.session().state(), SessionState::Uninitialized);
}

#[test]
fn test_open_malformed_device_number() {
    let h = Harness::new();
    assert_eq!(
        h.send("request/7/open/usb0"),
        vec![debug("request/7/open/usb0"), "response/7/false".to_string()]
    );
    assert_eq!(h.send("request/8/open")[1], "response/8/false");
    assert_eq!(h.send("request/9/open/0/3")[1], "response/9/false");
    assert_eq!(h.driver.stats().transports_created, 0);
}

#[test]
fn test_repeated_open_releases_previous_device() {
    let h = Harness::new();
    h.send("request/1/open/0");
    h.send("request/2/open/0");
    h.send("request/3/open/0");

    let stats = h.driver.stats();
    assert_eq!(stats.transports_created, 3);
    assert_eq!(stats.transports_dropped, 2);
    assert_eq!(stats.closes, 2);
}

#[test]
fn test_close_without_open() {
    let h = Harness::new();
    assert_eq!(
        h.send("request/1/close"),
        vec![debug("request/1/close"), "response/1/".to_string()]
    );
    assert_eq!(h.driver.stats().closes, 0);
}

#[test]
fn test_close_releases_device() {
    let h = Harness::new();
    h.send("request/1/open/0");
    assert_eq!(h.send("request/2/close")[1], "response/2/");

    let stats = h.driver.stats();
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.transports_dropped, 1);
    assert_eq!(h.dispatcher.session().state(), SessionState::Closed);
    assert_eq!(h.send("message/4A00")[1], "error/channel_not_opened");

    // Reopen after close
    assert_eq!(h.send("request/3/open/0")[1], "response/3/true");
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_message_without_open() {
    let h = Harness::new();
    assert_eq!(
        h.send("message/AABB"),
        vec![debug("message/AABB"), "error/channel_not_opened".to_string()]
    );
}

#[test]
fn test_message_without_open_ignores_bad_payload() {
    let h = Harness::new();
    assert_eq!(h.send("message/XYZ")[1], "error/channel_not_opened");
}

#[test]
fn test_message_is_framed_and_written() {
    let h = Harness::new();
    h.send("request/1/open/0");

    assert_eq!(h.send("message/4a00"), vec![debug("message/4a00")]);
    assert_eq!(
        h.driver.stats().written,
        vec![vec![0xA4, 0x01, 0x4A, 0x00, 0xEF]]
    );
}

#[test]
fn test_message_invalid_payload() {
    let h = Harness::new();
    h.send("request/1/open/0");

    let invalid = Response::Error(ErrorReason::InvalidPayload).to_line();
    assert_eq!(h.send("message/ABC")[1], invalid);
    assert_eq!(h.send("message/GG00")[1], invalid);
    assert_eq!(h.send("message/")[1], invalid);
    assert_eq!(h.send(&format!("message/{}", "00".repeat(64)))[1], invalid);
    assert!(h.driver.stats().written.is_empty());
}

#[test]
fn test_message_with_trailing_checksum() {
    let h = Harness::new();
    h.send("request/1/open/0");

    // Hosts send the frame minus sync and length, checksum included
    assert_eq!(h.send("message/4A00EF"), vec![debug("message/4A00EF")]);
    assert_eq!(
        h.driver.stats().written,
        vec![vec![0xA4, 0x01, 0x4A, 0x00, 0xEF]]
    );
}

#[test]
fn test_message_body_size_limit() {
    let h = Harness::new();
    h.send("request/1/open/0");

    let mut body = vec![0x4E];
    body.resize(MAX_MESSAGE_BODY_SIZE, 0x5A);
    let frame = FrameCodec::encode(&body).unwrap();

    // Largest body, with and without the trailing checksum
    assert_eq!(h.send(&format!("message/{}", hex::encode(&body))).len(), 1);
    assert_eq!(h.send(&format!("message/{}", hex::encode(&frame[2..]))).len(), 1);
    assert_eq!(h.driver.stats().written, vec![frame.clone(), frame]);

    // Anything longer is rejected before reaching the device
    let mut long = body.clone();
    for _ in 0..5 {
        long.push(0x5A);
        assert_eq!(
            h.send(&format!("message/{}", hex::encode(&long)))[1],
            "error/invalid_payload",
            "{} bytes",
            long.len()
        );
    }
    assert_eq!(h.driver.stats().written.len(), 2);
}

#[test]
fn test_message_write_failure() {
    let h = Harness::new();
    h.send("request/1/open/0");
    h.driver.set_failures(MockFailures {
        write: true,
        ..Default::default()
    });

    assert_eq!(h.send("message/4A00")[1], "error/write_failed");
}

#[test]
fn test_inbound_frame_is_forwarded() {
    let h = Harness::new();
    h.send("request/1/open/0");

    assert!(h.driver.inject_rx(&STARTUP_FRAME));
    assert_eq!(h.lines().last().unwrap(), "message/A4016F00CA");
    assert_eq!(h.dispatcher.session().completion().event_count(), 1);
}

// ============================================================================
// Loop Tests
// ============================================================================

#[test]
fn test_ping_and_malformed_lines() {
    let h = Harness::new();
    assert_eq!(h.send("ping/1700000000000"), vec![debug("ping/1700000000000")]);

    let malformed = "error/malformed_request".to_string();
    assert_eq!(h.send("hello"), vec![debug("hello"), malformed.clone()]);
    assert_eq!(h.send(""), vec![debug(""), malformed.clone()]);
    assert_eq!(h.send("request/1"), vec![debug("request/1"), malformed.clone()]);
    assert_eq!(h.send("request/1/reset"), vec![debug("request/1/reset"), malformed]);
}

#[test]
fn test_panicking_command_does_not_stop_loop() {
    let h = Harness::new();
    h.send("request/1/open/0");
    h.driver.set_failures(MockFailures {
        write_panics: true,
        ..Default::default()
    });

    assert_eq!(h.send("message/4A00"), vec![debug("message/4A00")]);

    h.driver.set_failures(MockFailures::default());
    assert_eq!(h.send("message/4A00"), vec![debug("message/4A00")]);
    assert_eq!(h.driver.stats().written.len(), 1);
    assert_eq!(h.send("request/2/close")[1], "response/2/");
}

#[test]
fn test_run_continues_after_panic() {
    let h = Harness::new();
    h.send("request/1/open/0");
    h.driver.set_failures(MockFailures {
        write_panics: true,
        ..Default::default()
    });

    h.dispatcher
        .run(Cursor::new("message/4A00\nrequest/2/close\nmessage/4A00\n"))
        .unwrap();

    assert_eq!(
        h.lines()[2..].to_vec(),
        vec![
            debug("message/4A00"),
            debug("request/2/close"),
            "response/2/".to_string(),
            debug("message/4A00"),
            "error/channel_not_opened".to_string(),
        ]
    );
}

#[test]
fn test_every_line_is_echoed_first() {
    let h = Harness::new();
    let input = [
        "request/1/open/0",
        "message/4A00",
        "garbage",
        "message/ZZ",
        "ping/1",
        "request/2/close",
        "message/4A00",
    ];
    let text = input.join("\n") + "\n";
    h.dispatcher.run(Cursor::new(text)).unwrap();

    let lines = h.lines();
    let mut pos = 0;
    for line in input {
        assert_eq!(lines[pos], debug(line), "echo for {:?}", line);
        pos += 1;
        while pos < lines.len() && !lines[pos].starts_with("debug/") {
            pos += 1;
        }
    }
    assert_eq!(pos, lines.len());
    assert_eq!(lines.iter().filter(|l| l.starts_with("debug/")).count(), input.len());
}

#[test]
fn test_run_handles_crlf_and_invalid_utf8() {
    let h = Harness::new();
    let mut input = b"request/1/open/0\r\n".to_vec();
    input.extend_from_slice(b"\xFF\xFE\n");
    input.extend_from_slice(b"request/2/close");

    h.dispatcher.run(Cursor::new(input)).unwrap();

    let lines = h.lines();
    assert_eq!(lines[0], debug("request/1/open/0"));
    assert_eq!(lines[1], "response/1/true");
    assert!(lines[2].starts_with("debug/"));
    assert_eq!(lines[3], "error/malformed_request");
    assert_eq!(lines[4], debug("request/2/close"));
    assert_eq!(lines[5], "response/2/");
}

#[test]
fn test_output_lines_parse_as_responses() {
    let h = Harness::new();
    h.send("request/1/open/0");
    h.driver.inject_rx(&STARTUP_FRAME);
    h.send("request/2/close");

    let parsed: Vec<Response> = h
        .lines()
        .iter()
        .map(|l| Response::parse(l).expect("valid output line"))
        .collect();
    assert_eq!(
        parsed,
        vec![
            Response::Debug("request/1/open/0".to_string()),
            Response::Opened {
                id: "1".to_string(),
                opened: true
            },
            Response::Message(STARTUP_FRAME.to_vec()),
            Response::Debug("request/2/close".to_string()),
            Response::Closed { id: "2".to_string() },
        ]
    );
}
