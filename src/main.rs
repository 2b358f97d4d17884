//! PinMe reader - UHF RFID reader daemon
//!
//! Scans the board for tags on a fixed interval, reports presence changes
//! and play sessions to the backend, and executes commands queued for this
//! device. Runs until SIGINT/SIGTERM.

use pinme_reader::app::Context;
use pinme_reader::clock::SystemClock;
use pinme_reader::config::AppConfig;
use pinme_reader::error::{Error, Result};
use pinme_reader::remote::rest::RestBackend;
use pinme_reader::transport::SerialTransport;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `pinme-reader <path>` (positional)
/// - `pinme-reader --config <path>` (flag-based)
/// - `pinme-reader -c <path>` (short flag)
///
/// Defaults to `/etc/pinme-reader.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/pinme-reader.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = AppConfig::from_file(&config_path)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
        .init();

    log::info!("PinMe reader v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    log::info!(
        "Device: {} (backend {})",
        config.backend.device_id,
        config.backend.url
    );

    let transport = SerialTransport::open(&config.serial.port, config.serial.baud_rate)?;
    log::info!(
        "Reader on {} at {} baud",
        config.serial.port,
        config.serial.baud_rate
    );

    let backend = RestBackend::new(&config.backend);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        flag.store(true, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting signal handler: {}", e)))?;

    let mut context = Context::new(config, transport, backend, SystemClock);
    context.run(&shutdown);

    log::info!("PinMe reader stopped");
    Ok(())
}
