//! Composition inputs

use lorascope_core::BlockLayout;
use serde::{Deserialize, Serialize};

/// One stored adapter, as supplied for a composition call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterComposeInput {
    /// Stable adapter id
    pub id: String,
    /// Base model the adapter was trained against
    pub base_model_code: String,
    /// Layout of `block_weights`
    pub layout: BlockLayout,
    /// Normalized block weights
    pub block_weights: Vec<f64>,
}

impl AdapterComposeInput {
    /// Create an input
    pub fn new(
        id: impl Into<String>,
        base_model_code: impl Into<String>,
        layout: BlockLayout,
        block_weights: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            base_model_code: base_model_code.into(),
            layout,
            block_weights,
        }
    }

    /// Base model code as compared by the validator
    pub fn normalized_base_model(&self) -> String {
        self.base_model_code.trim().to_uppercase()
    }
}

/// Per-adapter strength settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeSettings {
    /// Strength on the model channel
    #[serde(alias = "strength_model")]
    pub model_strength: f64,
    /// Strength on the clip channel
    #[serde(alias = "strength_clip")]
    pub clip_strength: f64,
    /// Whether the adapter may contribute to the clip channel
    #[serde(alias = "affect_clip")]
    pub clip_enabled: bool,
    /// Scalar A (1.0 when unset)
    #[serde(rename = "A", alias = "a", skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    /// Scalar B (1.0 when unset)
    #[serde(rename = "B", alias = "b", skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
}

impl ComposeSettings {
    /// Settings with the given model strength
    pub fn with_model_strength(mut self, strength: f64) -> Self {
        self.model_strength = strength;
        self
    }

    /// Settings with the given clip strength
    pub fn with_clip_strength(mut self, strength: f64) -> Self {
        self.clip_strength = strength;
        self
    }

    /// Enable or disable the clip channel
    pub fn with_clip_enabled(mut self, enabled: bool) -> Self {
        self.clip_enabled = enabled;
        self
    }

    /// Set both scalars
    pub fn with_ab(mut self, a: f64, b: f64) -> Self {
        self.a = Some(a);
        self.b = Some(b);
        self
    }

    /// Effective A
    pub fn a_or_default(&self) -> f64 {
        self.a.unwrap_or(1.0)
    }

    /// Effective B
    pub fn b_or_default(&self) -> f64 {
        self.b.unwrap_or(1.0)
    }

    /// Whether the clip channel takes this adapter
    pub fn contributes_clip(&self) -> bool {
        self.clip_enabled && self.clip_strength != 0.0
    }
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            model_strength: 1.0,
            clip_strength: 0.0,
            clip_enabled: true,
            a: None,
            b: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ComposeSettings::default();
        assert_eq!(settings.model_strength, 1.0);
        assert_eq!(settings.clip_strength, 0.0);
        assert!(settings.clip_enabled);
        assert_eq!(settings.a_or_default(), 1.0);
        assert_eq!(settings.b_or_default(), 1.0);
        assert!(!settings.contributes_clip());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let settings: ComposeSettings =
            serde_json::from_str(r#"{"strength_clip": 0.5, "A": 2.0}"#).unwrap();
        assert_eq!(settings.model_strength, 1.0);
        assert_eq!(settings.clip_strength, 0.5);
        assert_eq!(settings.a, Some(2.0));
        assert_eq!(settings.b_or_default(), 1.0);
        assert!(settings.contributes_clip());

        let disabled: ComposeSettings =
            serde_json::from_str(r#"{"clip_strength": 0.5, "affect_clip": false}"#).unwrap();
        assert!(!disabled.contributes_clip());
    }

    #[test]
    fn test_normalized_base_model() {
        let input = AdapterComposeInput::new("a", "  flux1-d ", BlockLayout::unet_57(), vec![]);
        assert_eq!(input.normalized_base_model(), "FLUX1-D");
    }

    #[test]
    fn test_input_from_json() {
        let input: AdapterComposeInput = serde_json::from_str(
            r#"{"id": "x", "base_model_code": "FLUX", "layout": "Flux_Double_57", "block_weights": [0.5]}"#,
        )
        .unwrap();
        assert_eq!(input.layout.identifier(), "flux_double_57");
    }
}
