//! Lorascope Core - Adapter block structure
//!
//! Reads an adapter's parameter names, places each parameter in a canonical
//! structural block and measures how strongly the adapter touches every block.
//!
//! # Pipeline
//!
//! ```text
//! TensorSource → classify (key → block index) → aggregate (L2 sums) → BlockVector
//!                                                                        ↑
//!                                                           BlockLayout (family, count)
//! ```
//!
//! Everything here is synchronous and pure. Files are never opened by this
//! crate: callers hand over a [`TensorSource`], for example a
//! [`SafetensorsSource`] over bytes they read themselves.

pub mod aggregate;
pub mod classify;
pub mod clip;
pub mod error;
pub mod layout;
pub mod scan;
pub mod source;
pub mod tensor;

// Re-export commonly used types
pub use aggregate::{BlockVector, ClassifiedTensor, StrengthAccumulator, aggregate, round_to};
pub use classify::{
    ArchitectureFamily, MAX_INDEXED_BLOCKS, TransformerSlot, classify_transformer_key,
    classify_unet57_key,
};
pub use clip::{ClipContribution, clip_contribution};
pub use error::{Result, ScanError, SourceError};
pub use layout::{
    BlockLayout, LayoutFamily, LayoutParseError, LayoutWarning, check_block_weights, resolve,
};
pub use scan::{AdapterScanner, FamilySelection, ScanConfig, ScanKind, ScanResult, scan};
pub use source::SafetensorsSource;
pub use tensor::{DataType, InMemorySource, NamedTensor, TensorData, TensorSource};
