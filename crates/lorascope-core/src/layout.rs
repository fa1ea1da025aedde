//! Block layout taxonomy
//!
//! A layout names the structural shape of an adapter's block vector: which
//! architecture family produced it and how many blocks it carries.
//!
//! Two kinds of identifiers are recognised:
//!
//! - fixed names with a hardcoded block count (`flux_fallback_16`, `unet_57`)
//! - suffixed names `<prefix>_<N>` where `N` is the expected block count
//!   (`flux_transformer_<N>`, `flux_double_<N>`, `flux_te_<N>`)

use crate::scan::ScanKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Neutral 16-block placeholder layout
pub const FLUX_FALLBACK_16: &str = "flux_fallback_16";

/// Fixed 57-slot UNet layout
pub const UNET_57: &str = "unet_57";

/// Block count of the neutral placeholder layout
pub const FLUX_FALLBACK_BLOCK_COUNT: usize = 16;

/// Block count of the fixed UNet layout
pub const UNET_57_BLOCK_COUNT: usize = 57;

/// Architecture family a layout belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutFamily {
    /// Neutral placeholder for adapters without detected blocks
    FluxFallback,
    /// Fixed 57-slot UNet
    Unet57,
    /// Single transformer blocks, count taken from the file
    FluxTransformer,
    /// Double (+ single) blocks
    FluxDouble,
    /// Text-encoder layers only
    FluxTextEncoder,
}

impl LayoutFamily {
    const SUFFIXED: [LayoutFamily; 3] = [
        LayoutFamily::FluxTransformer,
        LayoutFamily::FluxDouble,
        LayoutFamily::FluxTextEncoder,
    ];

    /// Identifier prefix for suffixed families
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Self::FluxTransformer => Some("flux_transformer"),
            Self::FluxDouble => Some("flux_double"),
            Self::FluxTextEncoder => Some("flux_te"),
            Self::FluxFallback | Self::Unet57 => None,
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::SUFFIXED
            .into_iter()
            .find(|family| family.prefix() == Some(prefix))
    }

    /// Whether combined A/B scalars are meaningful for this family
    pub fn supports_ab(&self) -> bool {
        match self {
            Self::FluxFallback | Self::FluxTransformer | Self::FluxTextEncoder => false,
            Self::FluxDouble | Self::Unet57 => true,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FluxFallback => "Flux fallback",
            Self::Unet57 => "UNet 57-slot",
            Self::FluxTransformer => "Flux transformer",
            Self::FluxDouble => "Flux double blocks",
            Self::FluxTextEncoder => "Flux text encoder",
        }
    }
}

/// A resolved block layout
///
/// Only [`BlockLayout::resolve`] and the typed constructors create values, so
/// an existing layout always carries a lowercase identifier that resolves
/// back to itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockLayout {
    identifier: String,
    family: LayoutFamily,
    expected_block_count: usize,
}

impl BlockLayout {
    /// Resolve a layout identifier
    ///
    /// Input is trimmed and lowercased. Unknown names, unknown prefixes,
    /// non-numeric or zero suffixes all yield `None`.
    pub fn resolve(raw: &str) -> Option<Self> {
        let identifier = raw.trim().to_lowercase();

        match identifier.as_str() {
            "" => return None,
            FLUX_FALLBACK_16 => return Some(Self::flux_fallback()),
            UNET_57 => return Some(Self::unet_57()),
            _ => {}
        }

        let (prefix, suffix) = identifier.rsplit_once('_')?;
        let family = LayoutFamily::from_prefix(prefix)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let expected_block_count: usize = suffix.parse().ok()?;
        if expected_block_count == 0 {
            return None;
        }

        Some(Self {
            identifier,
            family,
            expected_block_count,
        })
    }

    /// The neutral 16-block placeholder layout
    pub fn flux_fallback() -> Self {
        Self {
            identifier: FLUX_FALLBACK_16.to_string(),
            family: LayoutFamily::FluxFallback,
            expected_block_count: FLUX_FALLBACK_BLOCK_COUNT,
        }
    }

    /// The fixed 57-slot UNet layout
    pub fn unet_57() -> Self {
        Self {
            identifier: UNET_57.to_string(),
            family: LayoutFamily::Unet57,
            expected_block_count: UNET_57_BLOCK_COUNT,
        }
    }

    /// Build a suffixed layout (`None` for fixed families or a zero count)
    pub fn suffixed(family: LayoutFamily, block_count: usize) -> Option<Self> {
        let prefix = family.prefix()?;
        if block_count == 0 {
            return None;
        }
        Some(Self {
            identifier: format!("{prefix}_{block_count}"),
            family,
            expected_block_count: block_count,
        })
    }

    /// Conservative inference when only a block count is known
    pub fn infer_from_block_count(block_count: usize) -> Option<Self> {
        match block_count {
            0 => None,
            UNET_57_BLOCK_COUNT => Some(Self::unet_57()),
            n => Self::suffixed(LayoutFamily::FluxTransformer, n),
        }
    }

    /// Layout for a scan outcome with `block_count` blocks
    pub fn for_scan_kind(kind: ScanKind, block_count: usize) -> Option<Self> {
        match kind {
            ScanKind::SingleTransformer => {
                Self::suffixed(LayoutFamily::FluxTransformer, block_count)
            }
            ScanKind::DoubleSingle => Self::suffixed(LayoutFamily::FluxDouble, block_count),
            ScanKind::TextEncoder => Self::suffixed(LayoutFamily::FluxTextEncoder, block_count),
            ScanKind::Unet57 => Some(Self::unet_57()),
        }
    }

    /// Normalized identifier
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Architecture family
    pub fn family(&self) -> LayoutFamily {
        self.family
    }

    /// Number of blocks a vector in this layout carries
    pub fn expected_block_count(&self) -> usize {
        self.expected_block_count
    }

    /// Whether combined A/B scalars are meaningful for this layout
    pub fn supports_ab(&self) -> bool {
        self.family.supports_ab()
    }

    /// Check a stored weight vector against this layout
    ///
    /// Problems are reported, never fixed: at most one warning per kind.
    pub fn check_weights(&self, weights: &[f64]) -> Vec<LayoutWarning> {
        let mut warnings = Vec::new();

        if weights.len() != self.expected_block_count {
            warnings.push(LayoutWarning::CountMismatch {
                expected: self.expected_block_count,
                actual: weights.len(),
            });
        }

        warnings.extend(value_warnings(weights));
        warnings
    }
}

/// Check a stored weight vector against an optional layout
///
/// Without a layout only the per-weight checks apply.
pub fn check_block_weights(layout: Option<&BlockLayout>, weights: &[f64]) -> Vec<LayoutWarning> {
    match layout {
        Some(layout) => layout.check_weights(weights),
        None => value_warnings(weights),
    }
}

/// First non-finite and first out-of-range weight
fn value_warnings(weights: &[f64]) -> Vec<LayoutWarning> {
    let mut warnings = Vec::new();

    if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
        warnings.push(LayoutWarning::NonFinite { index });
    }

    if let Some((index, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| w.is_finite() && !(0.0..=1.0).contains(*w))
    {
        warnings.push(LayoutWarning::OutOfRange { index, value });
    }

    warnings
}

/// Resolve an optional layout identifier
pub fn resolve(raw: Option<&str>) -> Option<BlockLayout> {
    raw.and_then(BlockLayout::resolve)
}

impl fmt::Display for BlockLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

/// Layout parse error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognised block layout: '{input}'")]
pub struct LayoutParseError {
    /// The rejected input, as given
    pub input: String,
}

impl FromStr for BlockLayout {
    type Err = LayoutParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| LayoutParseError {
            input: s.to_string(),
        })
    }
}

impl TryFrom<String> for BlockLayout {
    type Error = LayoutParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlockLayout> for String {
    fn from(layout: BlockLayout) -> Self {
        layout.identifier
    }
}

/// Non-fatal problem found in a stored weight vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutWarning {
    /// Vector length differs from the layout's block count
    CountMismatch { expected: usize, actual: usize },
    /// A weight falls outside [0, 1]
    OutOfRange { index: usize, value: f64 },
    /// A weight is NaN or infinite
    NonFinite { index: usize },
}

impl fmt::Display for LayoutWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch { expected, actual } => write!(
                f,
                "layout expects {expected} blocks but the vector has {actual}"
            ),
            Self::OutOfRange { index, value } => {
                write!(f, "block {index} weight {value} falls outside [0,1]")
            }
            Self::NonFinite { index } => write!(f, "block {index} weight is not finite"),
        }
    }
}
