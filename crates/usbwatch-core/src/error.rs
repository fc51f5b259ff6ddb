//! Error types for usbwatch core.

use thiserror::Error;

/// Core error type.
///
/// Parsing never fails; these only cover running the enumeration command.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to run enumeration command `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read output of `{command}`: {source}")]
    CommandIo {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
