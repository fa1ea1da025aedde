//! Error types for composition and allocation

use crate::validator::CompatibilityReport;
use thiserror::Error;

/// Composition errors
///
/// Only conditions that abort the whole call live here. Degenerate strengths
/// are warnings on the result instead.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Vectors of different lengths cannot be blended
    #[error("Block vector of '{id}' has {actual} entries, expected {expected}")]
    LengthMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// The set mixes base models or layouts
    #[error("Incompatible adapter set: {}", .0.summary())]
    Incompatible(CompatibilityReport),
}

/// Result type for composition
pub type Result<T> = std::result::Result<T, ComposeError>;
