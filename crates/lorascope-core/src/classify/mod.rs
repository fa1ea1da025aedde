//! Tensor key classification
//!
//! Two structurally unrelated families map parameter names onto block
//! indices:
//!
//! - [`transformer`]: data-driven index spaces (single transformer blocks,
//!   the double+single split, text-encoder layers)
//! - [`unet57`]: a fixed 57-slot offset table that fails fast on keys it
//!   cannot place
//!
//! Both are pure functions over ordered rule tables; the first matching rule
//! wins.

pub mod transformer;
pub mod unet57;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use transformer::{
    DOUBLE_BLOCK_COUNT, DOUBLE_SINGLE_BLOCK_COUNT, MAX_INDEXED_BLOCKS, SINGLE_BLOCK_COUNT,
    TransformerSlot, classify_transformer_key,
};
pub use unet57::{classify_unet57_key, is_unet57_candidate};

/// Classifier family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureFamily {
    /// Transformer-style keys (variable block count)
    Transformer,
    /// Fixed 57-slot UNet keys
    Unet57,
}

impl ArchitectureFamily {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Transformer => "transformer",
            Self::Unet57 => "unet_57",
        }
    }
}

impl fmt::Display for ArchitectureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Capture group `group` of a rule match, parsed as an index
fn capture_index(caps: &regex::Captures<'_>, group: usize) -> Option<usize> {
    caps.get(group)?.as_str().parse().ok()
}
