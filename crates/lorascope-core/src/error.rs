//! Error types for adapter scanning

use crate::classify::ArchitectureFamily;
use thiserror::Error;

/// Scan errors
///
/// Any of these aborts the scan of one file; no partial block vector is
/// ever returned alongside them.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Not a single key matched any known family
    #[error("No recognised block structure found among {keys} tensor key(s)")]
    UnrecognizedArchitecture { keys: usize },

    /// A key passed a family's namespace check but no slot rule claimed it
    #[error("Tensor key could not be mapped to the {family} layout: {key} ({reason})")]
    UnmappableTensorKey {
        family: ArchitectureFamily,
        key: String,
        reason: String,
    },

    /// The tensor source failed while the scan was reading it
    #[error("Tensor source error: {0}")]
    Source(#[from] SourceError),
}

impl ScanError {
    /// Build an unmappable-key error
    pub fn unmappable(
        family: ArchitectureFamily,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnmappableTensorKey {
            family,
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Tensor source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid tensor container: {0}")]
    Format(String),

    #[error("Tensor not found: {0}")]
    NotFound(String),

    #[error("Unsupported dtype {dtype} for tensor {name}")]
    UnsupportedDtype { name: String, dtype: String },
}

/// Result type for scan operations
pub type Result<T> = std::result::Result<T, ScanError>;
