//! Weighted block-vector composition
//!
//! Blends the block weights of a compatible adapter set into one vector per
//! channel:
//!
//! ```text
//! model[i] = Σ weight_k[i] · model_strength_k / Σ model_strength_k
//! clip[i]  = Σ weight_k[i] · clip_strength_k  / Σ clip_strength_k   (clip contributors only)
//! ```
//!
//! Combined A/B scalars use the model strengths and exist only for layouts
//! that support them.

use crate::adapter::{AdapterComposeInput, ComposeSettings};
use crate::config::ComposerConfig;
use crate::error::{ComposeError, Result};
use crate::validator::validate_compatibility;
use lorascope_core::{BlockLayout, round_to};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{Level, debug, span, warn};

/// Stable warning code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// Empty adapter list
    NoAdapters,
    /// Model strengths sum to zero
    ZeroModelStrength,
    /// No adapter qualifies for the clip channel
    NoClipContributors,
    /// Clip contributors' strengths sum to zero
    ZeroClipStrength,
}

impl WarningCode {
    /// Wire form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAdapters => "no_adapters",
            Self::ZeroModelStrength => "zero_model_strength",
            Self::NoClipContributors => "no_clip_contributors",
            Self::ZeroClipStrength => "zero_clip_strength",
        }
    }

    /// Default message for the code
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoAdapters => "No adapters available to combine",
            Self::ZeroModelStrength => {
                "Sum of model strengths is 0; returned all-zero combined model weights"
            }
            Self::NoClipContributors => {
                "No adapters contributed to the clip channel; combined clip weights are null"
            }
            Self::ZeroClipStrength => {
                "Sum of eligible clip strengths is 0; returned all-zero clip weights"
            }
        }
    }
}

/// Non-fatal composition warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeWarning {
    /// Stable code
    pub code: WarningCode,
    /// Human-readable message
    pub message: String,
}

impl ComposeWarning {
    /// Warning with the code's default message
    pub fn new(code: WarningCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
        }
    }
}

impl fmt::Display for ComposeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

/// Combined vectors and scalars of one composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    /// Blended model-channel weights
    pub combined_model: Vec<f64>,
    /// Blended clip-channel weights, `None` without contributors
    pub combined_clip: Option<Vec<f64>>,
    /// Blended A (A/B layouts only)
    pub combined_a: Option<f64>,
    /// Blended B (A/B layouts only)
    pub combined_b: Option<f64>,
    /// Non-fatal problems
    pub warnings: Vec<ComposeWarning>,
    /// Decimal places every number was rounded to
    pub precision: u32,
}

impl CombinedResult {
    /// Canonical CSV of the model channel
    pub fn model_csv(&self) -> String {
        canonical_csv(&self.combined_model, self.precision)
    }

    /// Canonical CSV of the clip channel
    pub fn clip_csv(&self) -> Option<String> {
        self.combined_clip
            .as_deref()
            .map(|clip| canonical_csv(clip, self.precision))
    }

    /// Check for a warning code
    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Content digest of the canonical encodings
    ///
    /// Two results agree on this hash exactly when their canonical CSVs and
    /// scalars agree.
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.model_csv().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.clip_csv().unwrap_or_default().as_bytes());
        hasher.update(b"\n");
        for scalar in [self.combined_a, self.combined_b] {
            let encoded = scalar
                .map(|v| format!("{:.*}", self.precision as usize, v))
                .unwrap_or_default();
            hasher.update(encoded.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize()
    }
}

/// Fixed-decimal, comma-joined encoding of a vector
///
/// Values are rounded first so the text always matches the numbers.
pub fn canonical_csv(values: &[f64], precision: u32) -> String {
    values
        .iter()
        .map(|&v| format!("{:.*}", precision as usize, round_to(v, precision) + 0.0))
        .collect::<Vec<_>>()
        .join(",")
}

/// Weighted-average composer
#[derive(Debug, Clone, Default)]
pub struct WeightedComposer {
    config: ComposerConfig,
}

impl WeightedComposer {
    /// Create a composer
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Compose an already validated set
    ///
    /// `settings` is keyed by adapter id; missing entries take
    /// [`ComposeSettings::default`]. `layout` decides whether A/B exist.
    pub fn compose(
        &self,
        adapters: &[AdapterComposeInput],
        settings: &HashMap<String, ComposeSettings>,
        layout: Option<&BlockLayout>,
    ) -> Result<CombinedResult> {
        let span = span!(Level::DEBUG, "compose", adapters = adapters.len());
        let _enter = span.enter();

        let precision = self.config.precision;
        let mut warnings = Vec::new();

        let Some(first) = adapters.first() else {
            warn!("No adapters to combine");
            return Ok(CombinedResult {
                combined_model: Vec::new(),
                combined_clip: None,
                combined_a: None,
                combined_b: None,
                warnings: vec![ComposeWarning::new(WarningCode::NoAdapters)],
                precision,
            });
        };

        let expected = first.block_weights.len();
        if let Some(adapter) = adapters.iter().find(|a| a.block_weights.len() != expected) {
            return Err(ComposeError::LengthMismatch {
                id: adapter.id.clone(),
                expected,
                actual: adapter.block_weights.len(),
            });
        }

        let resolved: Vec<(&AdapterComposeInput, ComposeSettings)> = adapters
            .iter()
            .map(|a| (a, settings.get(&a.id).copied().unwrap_or_default()))
            .collect();

        let model_weighted: Vec<(&[f64], f64)> = resolved
            .iter()
            .map(|(a, s)| (a.block_weights.as_slice(), s.model_strength))
            .collect();
        let model_denominator: f64 = model_weighted.iter().map(|(_, s)| s).sum();

        let combined_model = match weighted_average(&model_weighted, expected) {
            Some(model) => model,
            None => {
                warnings.push(ComposeWarning::new(WarningCode::ZeroModelStrength));
                vec![0.0; expected]
            }
        };

        let clip_weighted: Vec<(&[f64], f64)> = resolved
            .iter()
            .filter(|(_, s)| s.contributes_clip())
            .map(|(a, s)| (a.block_weights.as_slice(), s.clip_strength))
            .collect();

        let combined_clip = if clip_weighted.is_empty() {
            warnings.push(ComposeWarning::new(WarningCode::NoClipContributors));
            None
        } else {
            Some(match weighted_average(&clip_weighted, expected) {
                Some(clip) => clip,
                None => {
                    warnings.push(ComposeWarning::new(WarningCode::ZeroClipStrength));
                    vec![0.0; expected]
                }
            })
        };

        let (combined_a, combined_b) = if layout.is_some_and(BlockLayout::supports_ab) {
            if model_denominator == 0.0 {
                (Some(0.0), Some(0.0))
            } else {
                let a: f64 = resolved
                    .iter()
                    .map(|(_, s)| s.a_or_default() * s.model_strength)
                    .sum();
                let b: f64 = resolved
                    .iter()
                    .map(|(_, s)| s.b_or_default() * s.model_strength)
                    .sum();
                (
                    Some(round_to(a / model_denominator, precision)),
                    Some(round_to(b / model_denominator, precision)),
                )
            }
        } else {
            (None, None)
        };

        for warning in &warnings {
            debug!(code = ?warning.code, "{}", warning.message);
        }

        Ok(CombinedResult {
            combined_model: round_all(combined_model, precision),
            combined_clip: combined_clip.map(|clip| round_all(clip, precision)),
            combined_a,
            combined_b,
            warnings,
            precision,
        })
    }

    /// Validate, then compose with the validated layout
    ///
    /// An incompatible set is returned as [`ComposeError::Incompatible`]
    /// carrying the full report.
    pub fn compose_validated(
        &self,
        adapters: &[AdapterComposeInput],
        settings: &HashMap<String, ComposeSettings>,
    ) -> Result<CombinedResult> {
        let report = validate_compatibility(adapters);
        if !report.compatible {
            return Err(ComposeError::Incompatible(report));
        }
        self.compose(adapters, settings, report.layout.as_ref())
    }
}

/// Strength-weighted average per index, `None` when strengths sum to zero
fn weighted_average(weighted: &[(&[f64], f64)], len: usize) -> Option<Vec<f64>> {
    let denominator: f64 = weighted.iter().map(|(_, s)| s).sum();
    if denominator == 0.0 {
        return None;
    }

    Some(
        (0..len)
            .map(|i| {
                weighted
                    .iter()
                    .map(|(weights, strength)| weights[i] * strength)
                    .sum::<f64>()
                    / denominator
            })
            .collect(),
    )
}

fn round_all(values: Vec<f64>, precision: u32) -> Vec<f64> {
    values.into_iter().map(|v| round_to(v, precision)).collect()
}
