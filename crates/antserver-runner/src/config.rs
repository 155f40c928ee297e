//! Command-line configuration and logging setup.

use std::time::Duration;

use antserver_device::constants::DEFAULT_BAUD_RATE;
use antserver_device::SerialConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// ANT+ bridge: line protocol on stdin/stdout, ANT USB stick on the other side.
#[derive(Debug, Clone, Parser)]
#[command(name = "antserver", version, about)]
pub struct BridgeConfig {
    /// Baud rate used for every open (50000 for AP1 sticks, 57600 for AT3/AP2)
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    /// Serial port to use instead of looking the stick up by device number
    #[arg(long)]
    pub port: Option<String>,

    /// Log filter when RUST_LOG is not set (logs go to stderr)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Do not log inbound device messages at debug level
    #[arg(long)]
    pub quiet_messages: bool,

    /// Serial read timeout in milliseconds
    #[arg(long, default_value_t = 50)]
    pub read_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
            log_level: "warn".to_string(),
            quiet_messages: false,
            read_timeout_ms: 50,
        }
    }
}

impl BridgeConfig {
    /// Serial transport settings derived from the flags.
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port: self.port.clone(),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Records emitted through
/// the `log` facade are captured as well. Calling this twice is harmless.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::parse_from(["antserver"]);
        assert_eq!(config.baud_rate, 50_000);
        assert_eq!(config.port, None);
        assert_eq!(config.log_level, "warn");
        assert!(!config.quiet_messages);
        assert_eq!(config.serial_config().read_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_flags() {
        let config = BridgeConfig::parse_from([
            "antserver",
            "--baud-rate",
            "57600",
            "--port",
            "/dev/ttyUSB1",
            "--quiet-messages",
        ]);
        assert_eq!(config.baud_rate, 57_600);
        assert!(config.quiet_messages);
        assert_eq!(config.serial_config().port.as_deref(), Some("/dev/ttyUSB1"));
    }
}
