//! Configuration for the PinMe reader daemon
//!
//! Loads configuration from a TOML file. Every section and field has a
//! default, so a minimal deployment file only needs the backend
//! credentials:
//!
//! ```toml
//! [backend]
//! url = "https://project.supabase.co"
//! anon_key = "..."
//! device_id = "PINME-0001"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub reader: ReaderConfig,
    pub presence: PresenceConfig,
    pub scan: ScanConfig,
    pub remote: RemoteConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

/// Serial link to the reader module
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "/dev/ttyS1")
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
        }
    }
}

/// Reader module behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Per-command wait for a complete response frame
    pub response_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 3000,
        }
    }
}

impl ReaderConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Presence state machine thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresenceConfig {
    /// Sightings at or above this RSSI count as "on the board" (dBm)
    #[serde(default = "default_rssi_threshold")]
    pub rssi_threshold: i16,

    /// Strong consecutive sightings needed to confirm in-place
    #[serde(default = "default_stable_cycles")]
    pub stable_cycles: u32,

    /// Missed sweeps before a tag is considered picked up (internal only)
    #[serde(default = "default_playing_after_missed")]
    pub playing_after_missed: u32,

    /// Missed sweeps before "out" is pushed to the backend
    #[serde(default = "default_out_after_missed")]
    pub out_after_missed: u32,

    /// RSSI jump between two sightings that means the tag was moved (dB)
    #[serde(default = "default_displacement_db")]
    pub displacement_db: i16,

    /// First sighting above this RSSI goes straight to in-place (dBm)
    #[serde(default = "default_initial_in_place_rssi")]
    pub initial_in_place_rssi: i16,

    /// Sighting above this RSSI confirms in-place without waiting (dBm)
    #[serde(default = "default_fast_path_rssi")]
    pub fast_path_rssi: i16,

    /// EPCs assigned to this board, tracked from boot even if never seen
    #[serde(default)]
    pub assigned_tags: Vec<String>,
}

fn default_rssi_threshold() -> i16 {
    -65
}
fn default_stable_cycles() -> u32 {
    3
}
fn default_playing_after_missed() -> u32 {
    2
}
fn default_out_after_missed() -> u32 {
    3
}
fn default_displacement_db() -> i16 {
    10
}
fn default_initial_in_place_rssi() -> i16 {
    -55
}
fn default_fast_path_rssi() -> i16 {
    -50
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            rssi_threshold: default_rssi_threshold(),
            stable_cycles: default_stable_cycles(),
            playing_after_missed: default_playing_after_missed(),
            out_after_missed: default_out_after_missed(),
            displacement_db: default_displacement_db(),
            initial_in_place_rssi: default_initial_in_place_rssi(),
            fast_path_rssi: default_fast_path_rssi(),
            assigned_tags: Vec::new(),
        }
    }
}

/// Periodic inventory cycle
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Time between scan cycle starts
    pub interval_ms: u64,
    /// Poll count sent with the multi-inventory command
    pub inventory_count: u16,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            inventory_count: 300,
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Remote command queue polling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub poll_interval_ms: u64,
    /// Maximum commands fetched per poll
    pub batch_size: u32,
    pub heartbeat_interval_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            batch_size: 10,
            heartbeat_interval_ms: 20_000,
        }
    }
}

impl RemoteConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// PostgREST backend endpoint, credentials and schema names
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project base URL, `/rest/v1/<table>` is appended
    pub url: String,
    pub anon_key: String,
    /// Per-device token; the anon key is used as bearer when empty
    pub device_jwt: String,
    pub device_id: String,
    pub fw_version: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,

    pub commands_table: String,
    pub command_status_column: String,
    /// Holds the command text while pending, the debug trace afterwards
    pub command_text_column: String,
    /// Fallback result rows point at the original command through this column
    pub command_reference_column: String,

    pub tags_table: String,
    pub tag_epc_column: String,
    pub sessions_table: String,
    pub devices_table: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            device_jwt: String::new(),
            device_id: String::new(),
            fw_version: env!("CARGO_PKG_VERSION").to_string(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            commands_table: "testuart".to_string(),
            command_status_column: "uart_result".to_string(),
            command_text_column: "uart_debug".to_string(),
            command_reference_column: "ref_id".to_string(),
            tags_table: "toys".to_string(),
            tag_epc_column: "rfid".to_string(),
            sessions_table: "play_sessions".to_string(),
            devices_table: "devices".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter (trace, debug, info, warn, error); RUST_LOG overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use pinme_reader::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("/etc/pinme-reader.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the control loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.presence;
        if p.stable_cycles == 0 {
            return Err(Error::Config("presence.stable_cycles must be at least 1".into()));
        }
        if p.playing_after_missed == 0 || p.out_after_missed < p.playing_after_missed {
            return Err(Error::Config(format!(
                "presence.out_after_missed ({}) must be >= playing_after_missed ({}) >= 1",
                p.out_after_missed, p.playing_after_missed
            )));
        }
        if p.displacement_db <= 0 {
            return Err(Error::Config("presence.displacement_db must be positive".into()));
        }
        if self.scan.inventory_count == 0 {
            return Err(Error::Config("scan.inventory_count must be at least 1".into()));
        }
        if self.remote.batch_size == 0 {
            return Err(Error::Config("remote.batch_size must be at least 1".into()));
        }
        if self.backend.device_id.trim().is_empty() {
            return Err(Error::Config("backend.device_id is required".into()));
        }
        if self.backend.url.trim().is_empty() {
            return Err(Error::Config("backend.url is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.presence.rssi_threshold, -65);
        assert_eq!(config.presence.stable_cycles, 3);
        assert_eq!(config.presence.playing_after_missed, 2);
        assert_eq!(config.presence.out_after_missed, 3);
        assert_eq!(config.presence.displacement_db, 10);
        assert_eq!(config.scan.inventory_count, 300);
        assert_eq!(config.remote.batch_size, 10);
        assert_eq!(config.backend.commands_table, "testuart");
    }

    #[test]
    fn test_minimal_toml() {
        let toml_content = r#"
[backend]
url = "https://example.supabase.co"
anon_key = "anon"
device_id = "PINME-0001"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.backend.device_id, "PINME-0001");
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.presence.fast_path_rssi, -50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides() {
        let toml_content = r#"
[serial]
port = "/dev/ttyS1"

[presence]
rssi_threshold = -70
assigned_tags = ["e2 00 12 34", "E2005678"]

[scan]
interval_ms = 30000

[backend]
url = "https://example.supabase.co"
device_id = "PINME-0002"

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyS1");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.presence.rssi_threshold, -70);
        assert_eq!(config.presence.stable_cycles, 3);
        assert_eq!(config.presence.assigned_tags.len(), 2);
        assert_eq!(config.scan.interval(), Duration::from_secs(30));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        let mut config = AppConfig::default();
        config.backend.url = "https://example.supabase.co".into();
        config.backend.device_id = "PINME-0001".into();
        assert!(config.validate().is_ok());

        config.presence.out_after_missed = 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.presence.out_after_missed = 3;
        config.remote.batch_size = 0;
        assert!(config.validate().is_err());

        config.remote.batch_size = 10;
        config.backend.device_id = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();
        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[presence]"));
        assert!(toml_string.contains("[backend]"));
        assert!(toml_string.contains("rssi_threshold = -65"));
    }
}
