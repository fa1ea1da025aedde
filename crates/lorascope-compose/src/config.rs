//! Composer and allocator configuration

use serde::{Deserialize, Serialize};

/// Default decimal places of combined outputs
pub const DEFAULT_PRECISION: u32 = 4;

/// Default in-role similarity above which allocations are damped
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.85;

/// Weighted composer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Decimal places of every combined number and CSV field
    pub precision: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

/// Role allocator configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Similarity threshold for overlap damping
    pub overlap_threshold: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}
