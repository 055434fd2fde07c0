//! Benchmark error types.

use thiserror::Error;

use crate::operation::Operation;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Benchmark errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid environment/flag input. Fatal before any benchmark runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// A strategy could not reach, authenticate to, or disconnect from its store.
    #[error("connection error: {0}")]
    Connection(String),

    /// Seeding data outside the measured region failed.
    #[error("setup error: {0}")]
    Setup(String),

    /// A measured call failed.
    #[error("operation error: {0}")]
    Operation(String),

    /// The strategy has no primitive for the requested operation.
    #[error("{strategy} does not support {operation}")]
    Unsupported {
        strategy: &'static str,
        operation: Operation,
    },

    /// Recreating the schema failed.
    #[error("schema reset failed: {0}")]
    Reset(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }

    pub(crate) fn setup(err: impl std::fmt::Display) -> Self {
        Self::Setup(err.to_string())
    }

    /// Whether the error means "skipped" rather than "broken".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
