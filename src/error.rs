//! Error types for the PinMe reader daemon

use crate::remote::command_text::CommandParseError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// PinMe reader error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote command text could not be parsed
    #[error("Invalid command: {0}")]
    CommandParse(#[from] CommandParseError),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Backend rejected or could not be reached
    #[error("Remote sink failure: {0}")]
    Remote(String),

    /// Configuration is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
