//! Adapter set compatibility
//!
//! Adapters can only be blended when they share one base model and one block
//! layout. Every violated rule is reported separately with the ids that
//! break it.

use crate::adapter::AdapterComposeInput;
use lorascope_core::BlockLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Stable reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Nothing to validate
    EmptyInput,
    /// More than one base model code
    BaseModelMismatch,
    /// More than one layout
    LayoutMismatch,
}

impl ReasonCode {
    /// Wire form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::BaseModelMismatch => "base_model_mismatch",
            Self::LayoutMismatch => "layout_mismatch",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violated compatibility rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompatibilityReason {
    /// Which rule
    pub code: ReasonCode,
    /// Human-readable explanation
    pub detail: String,
    /// Offending adapter ids, in input order
    pub ids: Vec<String>,
}

/// Validation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Whether the set can be composed
    pub compatible: bool,
    /// Violated rules
    pub reasons: Vec<IncompatibilityReason>,
    /// Shared base model code (compatible sets only)
    pub base_model: Option<String>,
    /// Shared layout (compatible sets only)
    pub layout: Option<BlockLayout>,
}

impl CompatibilityReport {
    /// Create a successful report
    pub fn success(base_model: String, layout: BlockLayout) -> Self {
        Self {
            compatible: true,
            reasons: Vec::new(),
            base_model: Some(base_model),
            layout: Some(layout),
        }
    }

    fn failing() -> Self {
        Self {
            compatible: false,
            reasons: Vec::new(),
            base_model: None,
            layout: None,
        }
    }

    /// Add a reason, marking the report incompatible
    pub fn add_reason(&mut self, reason: IncompatibilityReason) {
        self.compatible = false;
        self.base_model = None;
        self.layout = None;
        self.reasons.push(reason);
    }

    /// Find the reason with the given code
    pub fn reason(&self, code: ReasonCode) -> Option<&IncompatibilityReason> {
        self.reasons.iter().find(|r| r.code == code)
    }

    /// One-line description of all reasons
    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            return "compatible".to_string();
        }
        self.reasons
            .iter()
            .map(|r| format!("{}: {}", r.code, r.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate that adapters share one base model and one layout
pub fn validate_compatibility(adapters: &[AdapterComposeInput]) -> CompatibilityReport {
    let Some(first) = adapters.first() else {
        let mut report = CompatibilityReport::failing();
        report.add_reason(IncompatibilityReason {
            code: ReasonCode::EmptyInput,
            detail: "No adapters available for validation".to_string(),
            ids: Vec::new(),
        });
        return report;
    };

    let base_models: Vec<String> = adapters.iter().map(|a| a.normalized_base_model()).collect();
    let layouts: Vec<String> = adapters
        .iter()
        .map(|a| a.layout.identifier().to_string())
        .collect();

    let mut report =
        CompatibilityReport::success(first.normalized_base_model(), first.layout.clone());

    if let Some((dominant, ids)) = outliers(&base_models, adapters) {
        report.add_reason(IncompatibilityReason {
            code: ReasonCode::BaseModelMismatch,
            detail: format!(
                "Adapters have mismatched base model codes (majority '{dominant}', found {})",
                distinct(&base_models).join(", ")
            ),
            ids,
        });
    }

    if let Some((dominant, ids)) = outliers(&layouts, adapters) {
        report.add_reason(IncompatibilityReason {
            code: ReasonCode::LayoutMismatch,
            detail: format!(
                "Adapters have mismatched block layouts (majority '{dominant}', found {})",
                distinct(&layouts).join(", ")
            ),
            ids,
        });
    }

    debug!(
        adapters = adapters.len(),
        compatible = report.compatible,
        reasons = report.reasons.len(),
        "Validated adapter set"
    );

    report
}

/// Distinct values in order of first appearance
fn distinct(values: &[String]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for value in values {
        if !seen.contains(&value.as_str()) {
            seen.push(value);
        }
    }
    seen
}

/// The dominant value and the ids of adapters that differ from it
///
/// The dominant value is the most frequent one; ties go to the value seen
/// first. `None` when all values agree.
fn outliers(values: &[String], adapters: &[AdapterComposeInput]) -> Option<(String, Vec<String>)> {
    let candidates = distinct(values);
    if candidates.len() <= 1 {
        return None;
    }

    let mut dominant = candidates[0];
    let mut best = 0;
    for candidate in candidates {
        let count = values.iter().filter(|v| v.as_str() == candidate).count();
        if count > best {
            best = count;
            dominant = candidate;
        }
    }

    let ids = values
        .iter()
        .zip(adapters)
        .filter(|(value, _)| value.as_str() != dominant)
        .map(|(_, adapter)| adapter.id.clone())
        .collect();

    Some((dominant.to_string(), ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(id: &str, base: &str, layout: &str) -> AdapterComposeInput {
        AdapterComposeInput::new(id, base, BlockLayout::resolve(layout).unwrap(), vec![0.5; 3])
    }

    #[test]
    fn test_compatible_set() {
        let report = validate_compatibility(&[
            adapter("a", "flux1-d", "flux_double_57"),
            adapter("b", " FLUX1-D", "FLUX_DOUBLE_57"),
        ]);

        assert!(report.compatible);
        assert!(report.reasons.is_empty());
        assert_eq!(report.base_model.as_deref(), Some("FLUX1-D"));
        assert_eq!(report.layout.unwrap().identifier(), "flux_double_57");
    }

    #[test]
    fn test_empty_input() {
        let report = validate_compatibility(&[]);
        assert!(!report.compatible);
        assert_eq!(report.reasons.len(), 1);
        assert_eq!(report.reasons[0].code, ReasonCode::EmptyInput);
        assert!(report.base_model.is_none());
    }

    #[test]
    fn test_base_model_mismatch_lists_offenders_in_input_order() {
        let report = validate_compatibility(&[
            adapter("a", "SDXL", "unet_57"),
            adapter("b", "PONY", "unet_57"),
            adapter("c", "SDXL", "unet_57"),
            adapter("d", "SD15", "unet_57"),
        ]);

        assert!(!report.compatible);
        assert_eq!(report.reasons.len(), 1);
        let reason = report.reason(ReasonCode::BaseModelMismatch).unwrap();
        assert_eq!(reason.ids, vec!["b", "d"]);
        assert!(report.base_model.is_none());
        assert!(report.layout.is_none());
    }

    #[test]
    fn test_tie_goes_to_first_value() {
        let report = validate_compatibility(&[
            adapter("a", "FLUX", "flux_transformer_38"),
            adapter("b", "FLUX", "flux_double_57"),
        ]);

        let reason = report.reason(ReasonCode::LayoutMismatch).unwrap();
        assert_eq!(reason.ids, vec!["b"]);
        assert!(report.reason(ReasonCode::BaseModelMismatch).is_none());
    }

    #[test]
    fn test_one_reason_per_rule() {
        let report = validate_compatibility(&[
            adapter("a", "FLUX", "flux_double_57"),
            adapter("b", "SDXL", "unet_57"),
            adapter("c", "FLUX", "flux_double_57"),
        ]);

        let codes: Vec<ReasonCode> = report.reasons.iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            vec![ReasonCode::BaseModelMismatch, ReasonCode::LayoutMismatch]
        );
        assert_eq!(report.reasons[1].ids, vec!["b"]);
        assert!(report.summary().contains("layout_mismatch"));
    }

    #[test]
    fn test_report_serialization() {
        let report = validate_compatibility(&[]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["compatible"], false);
        assert_eq!(json["reasons"][0]["code"], "empty_input");
        assert_eq!(json["layout"], serde_json::Value::Null);
    }
}
