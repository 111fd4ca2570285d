//! Error types for switchboard-core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`SettingsStore`](crate::SettingsStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error while reading or writing the backing file.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not valid TOML.
    #[error("Failed to parse settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The settings could not be serialized.
    #[error("Failed to serialize settings: {0}")]
    Serialize(String),

    /// The store refused the operation.
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
}

/// Feature switch errors.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Feature name is empty or contains a reserved character.
    #[error("Invalid feature name '{0}': names must be non-empty and must not contain ';' or NUL")]
    InvalidName(String),

    /// Feature not known to the registry or panel.
    #[error("Feature not found: {0}")]
    NotFound(String),

    /// Environment variable could not be written.
    #[error("Cannot write environment variable '{variable}': {message}")]
    Environment { variable: String, message: String },

    /// Settings store failure.
    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),

    /// Feature discovery failure.
    #[error("Feature discovery failed: {0}")]
    Discovery(String),

    /// Legacy XML document could not be read.
    #[error("Invalid legacy feature document: {0}")]
    Legacy(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The restart request failed.
    #[error("Restart failed: {0}")]
    Restart(String),

    /// No restart capability is available.
    #[error("Restart is not available")]
    RestartUnavailable,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type for feature switch operations.
pub type Result<T> = std::result::Result<T, FeatureError>;
