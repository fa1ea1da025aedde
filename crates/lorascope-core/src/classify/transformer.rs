//! Transformer-style key classification
//!
//! Keys fall into one of three index spaces:
//!
//! ```text
//! transformer.single_transformer_blocks.<i>.*      → Transformer(i)   count = max + 1
//! lora_unet_double_blocks_<i>_*                    → Double(i)        slots 0..18
//! lora_unet_single_blocks_<i>_*                    → Single(i)        slots 19..56
//! lora_te{1,2}_text_model_encoder_layers_<i>_*     → TextEncoder(i)   count = max + 1
//! ```

use super::capture_index;
use regex::Regex;
use std::sync::LazyLock;

/// Double blocks in the fixed double+single ordering
pub const DOUBLE_BLOCK_COUNT: usize = 19;

/// Single blocks in the fixed double+single ordering
pub const SINGLE_BLOCK_COUNT: usize = 38;

/// Total slots in the fixed double+single ordering
pub const DOUBLE_SINGLE_BLOCK_COUNT: usize = DOUBLE_BLOCK_COUNT + SINGLE_BLOCK_COUNT;

/// Upper bound on block counts read from key indices
///
/// Transformer and text-encoder block counts come from the largest index in
/// the file; anything past this is treated as an unmappable key.
pub const MAX_INDEXED_BLOCKS: usize = 1024;

/// Where a transformer-style key belongs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformerSlot {
    /// Single transformer block
    Transformer(usize),
    /// Double block
    Double(usize),
    /// Single block of the double/single split
    Single(usize),
    /// Text-encoder layer
    TextEncoder(usize),
}

impl TransformerSlot {
    /// Whether the slot belongs to the double+single ordering
    pub fn is_double_single(&self) -> bool {
        matches!(self, Self::Double(_) | Self::Single(_))
    }

    /// Position within the fixed double+single ordering
    ///
    /// `None` for other index spaces and for indices beyond the segment size.
    pub fn double_single_index(&self) -> Option<usize> {
        match *self {
            Self::Double(i) if i < DOUBLE_BLOCK_COUNT => Some(i),
            Self::Single(i) if i < SINGLE_BLOCK_COUNT => Some(DOUBLE_BLOCK_COUNT + i),
            _ => None,
        }
    }
}

struct Rule {
    pattern: Regex,
    slot: fn(usize) -> TransformerSlot,
}

fn rule(pattern: &str, slot: fn(usize) -> TransformerSlot) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("transformer key pattern is a valid regex"),
        slot,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            r"(?i)transformer\.single_transformer_blocks\.(\d+)\.",
            TransformerSlot::Transformer,
        ),
        rule(r"(?i)lora_unet_double_blocks_(\d+)_", TransformerSlot::Double),
        rule(r"(?i)lora_unet_single_blocks_(\d+)_", TransformerSlot::Single),
        rule(
            r"(?i)lora_te[12]_text_model_encoder_layers_(\d+)_",
            TransformerSlot::TextEncoder,
        ),
    ]
});

/// Classify a parameter name, first matching rule wins
pub fn classify_transformer_key(name: &str) -> Option<TransformerSlot> {
    RULES.iter().find_map(|rule| {
        let caps = rule.pattern.captures(name)?;
        capture_index(&caps, 1).map(rule.slot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_transformer_blocks() {
        assert_eq!(
            classify_transformer_key(
                "transformer.single_transformer_blocks.7.attn.to_q.lora_A.weight"
            ),
            Some(TransformerSlot::Transformer(7))
        );
        assert_eq!(
            classify_transformer_key(
                "Transformer.Single_Transformer_Blocks.12.proj_out.lora_B.weight"
            ),
            Some(TransformerSlot::Transformer(12))
        );
    }

    #[test]
    fn test_double_and_single_blocks() {
        assert_eq!(
            classify_transformer_key("lora_unet_double_blocks_3_img_attn_qkv.lora_down.weight"),
            Some(TransformerSlot::Double(3))
        );
        assert_eq!(
            classify_transformer_key("lora_unet_single_blocks_37_linear1.lora_up.weight"),
            Some(TransformerSlot::Single(37))
        );
    }

    #[test]
    fn test_text_encoder_layers() {
        assert_eq!(
            classify_transformer_key("lora_te1_text_model_encoder_layers_0_mlp_fc1.lora_up.weight"),
            Some(TransformerSlot::TextEncoder(0))
        );
        assert_eq!(
            classify_transformer_key(
                "lora_te2_text_model_encoder_layers_11_self_attn_q_proj.alpha"
            ),
            Some(TransformerSlot::TextEncoder(11))
        );
        assert_eq!(
            classify_transformer_key("lora_te3_text_model_encoder_layers_1_mlp.alpha"),
            None
        );
    }

    #[test]
    fn test_unrelated_keys() {
        for key in [
            "lora_unet_down_blocks_0_resnets_0_conv1.lora_down.weight",
            "transformer.transformer_blocks.0.attn.to_q.lora_A.weight",
            "lora_unet_double_blocks_x_img_attn.weight",
            "",
        ] {
            assert_eq!(classify_transformer_key(key), None, "{key}");
        }
    }

    #[test]
    fn test_double_single_index() {
        assert_eq!(TransformerSlot::Double(0).double_single_index(), Some(0));
        assert_eq!(TransformerSlot::Double(18).double_single_index(), Some(18));
        assert_eq!(TransformerSlot::Double(19).double_single_index(), None);
        assert_eq!(TransformerSlot::Single(0).double_single_index(), Some(19));
        assert_eq!(TransformerSlot::Single(37).double_single_index(), Some(56));
        assert_eq!(TransformerSlot::Single(38).double_single_index(), None);
        assert_eq!(TransformerSlot::Transformer(0).double_single_index(), None);

        assert!(TransformerSlot::Single(40).is_double_single());
        assert!(!TransformerSlot::TextEncoder(0).is_double_single());
    }
}
