//! Text-encoder ("clip") contribution evidence from key names

use serde::{Deserialize, Serialize};

/// Lowercase substrings marking a text-encoder tensor
pub const CLIP_KEY_TOKENS: [&str; 5] = ["text_encoder", "text_model", "clip", "te1", "te2"];

/// Whether an adapter carries text-encoder tensors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipContribution {
    /// At least one key matched
    pub contributor: bool,
    /// Number of matching keys
    pub tensor_count: usize,
}

/// Decide clip contribution strictly from key names
pub fn clip_contribution<I, S>(names: I) -> ClipContribution
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let tensor_count = names
        .into_iter()
        .filter(|name| is_clip_key(name.as_ref()))
        .count();

    ClipContribution {
        contributor: tensor_count > 0,
        tensor_count,
    }
}

/// Check a single key
pub fn is_clip_key(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CLIP_KEY_TOKENS.iter().any(|token| lower.contains(token))
}
