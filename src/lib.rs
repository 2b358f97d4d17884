//! PinMe reader - UHF RFID reader daemon
//!
//! Drives a UHF RFID reader module over a serial link, turns noisy RSSI
//! sightings into stable tag presence events, and executes commands queued
//! on a remote backend.
//!
//! ## Layout
//!
//! - `reader`: frame codec, stream reassembler, response decoder, reader session
//! - `presence`: per-tag presence state machine
//! - `scan`: one bounded inventory cycle feeding the presence tracker
//! - `remote`: command queue cursor, command text grammar, REST backend
//! - `app`: the owned context and the cooperative control loop

pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod presence;
pub mod reader;
pub mod remote;
pub mod scan;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
