//! Error types for the breakdown core

use thiserror::Error;

/// Result type for breakdown operations
pub type Result<T> = std::result::Result<T, BreakdownError>;

/// Breakdown errors
#[derive(Error, Debug)]
pub enum BreakdownError {
    /// A template matched the reference but nothing matching it exists on disk
    #[error("No files found for template {template} (searched {searched})")]
    NotFound { template: String, searched: String },

    /// No publish record (or more than one) could back the computed update path
    #[error("Ambiguous update target for {node}: {reason}")]
    AmbiguousTarget { node: String, reason: String },

    /// Record store or filesystem fault
    #[error("Lookup failed: {0}")]
    LookupFailure(String),

    #[error("Update not applicable for {node}: {reason}")]
    NotApplicable { node: String, reason: String },

    #[error("No items selected for update")]
    NoSelection,

    #[error("Invalid template {name}: {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("Path {path} does not match template {template}")]
    PathMismatch { template: String, path: String },

    #[error("Missing value for key {key} in template {template}")]
    MissingField { template: String, key: String },

    #[error("Invalid value for key {key}: {reason}")]
    InvalidField { key: String, reason: String },

    #[error("Scene host unavailable: {0}")]
    HostUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
