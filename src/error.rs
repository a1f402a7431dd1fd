//! Crate-level error type.

use thiserror::Error;

/// Fatal failures that end the run. Device-reported protocol errors are
/// not in here; those are recovered through the replay queue.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
