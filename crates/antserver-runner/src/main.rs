//! `antserver`: bridge between a host process on stdin/stdout and an ANT USB stick.

use std::io;

use antserver_runner::{init_logging, BridgeConfig, Dispatcher, OutputWriter};
use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::parse();
    init_logging(&config.log_level);

    let dispatcher = Dispatcher::from_config(&config, OutputWriter::stdout());
    tracing::info!(
        baud_rate = config.baud_rate,
        port = ?config.port,
        "antserver ready"
    );

    dispatcher.run(io::stdin().lock())?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
