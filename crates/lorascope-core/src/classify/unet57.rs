//! Fixed 57-slot UNet key classification
//!
//! ```text
//! 0..=3    stem      conv_in, time_embedding.linear_{1,2}, add/class embedding
//! 4..=23   down x4   resnet 0, resnet 1, attention 0, attention 1, downsampler 0
//! 24..=26  mid       resnet 0, attention 0, resnet 1
//! 27..=54  up x4     resnet 0..2, attention 0..2, upsampler 0
//! 55..=56  head      conv_norm_out, conv_out
//! ```
//!
//! Keys that pass the namespace check but match no slot are rejected: that is
//! how a new architecture revision shows up.

use super::{ArchitectureFamily, capture_index};
use crate::error::ScanError;
use regex::Regex;
use std::sync::LazyLock;

const STAGE_COUNT: usize = 4;
const DOWN_OFFSET: usize = 4;
const MID_OFFSET: usize = 24;
const UP_OFFSET: usize = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Resnet,
    Attention,
    Sampler,
}

impl Component {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "resnets" => Some(Self::Resnet),
            "attentions" => Some(Self::Attention),
            "downsamplers" | "upsamplers" => Some(Self::Sampler),
            _ => None,
        }
    }
}

use Component::{Attention, Resnet, Sampler};

const DOWN_SLOTS: [(Component, usize); 5] = [
    (Resnet, 0),
    (Resnet, 1),
    (Attention, 0),
    (Attention, 1),
    (Sampler, 0),
];

const MID_SLOTS: [(Component, usize); 3] = [(Resnet, 0), (Attention, 0), (Resnet, 1)];

const UP_SLOTS: [(Component, usize); 7] = [
    (Resnet, 0),
    (Resnet, 1),
    (Resnet, 2),
    (Attention, 0),
    (Attention, 1),
    (Attention, 2),
    (Sampler, 0),
];

fn slot_offset(table: &[(Component, usize)], component: Component, inner: usize) -> Option<usize> {
    table.iter().position(|&slot| slot == (component, inner))
}

fn pattern(body: &str) -> Regex {
    Regex::new(&format!(r"(?i)(?:^|[._])(?:lora_)?unet[._]{body}(?:[._]|$)"))
        .expect("unet key pattern is a valid regex")
}

static STEM_RULES: LazyLock<Vec<(usize, Regex)>> = LazyLock::new(|| {
    vec![
        (0, pattern("conv_in")),
        (1, pattern(r"(?:time_embedding|time_embed)[._](?:linear_1|0)")),
        (2, pattern(r"(?:time_embedding|time_embed)[._](?:linear_2|2)")),
        (3, pattern("(?:add_embedding|class_embedding)")),
        (55, pattern("conv_norm_out")),
        (56, pattern("conv_out")),
    ]
});

static DOWN_RULE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"down_blocks[._](\d+)[._](resnets|attentions|downsamplers)[._](\d+)")
});

static MID_RULE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"mid_block[._](resnets|attentions)[._](\d+)"));

static UP_RULE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"up_blocks[._](\d+)[._](resnets|attentions|upsamplers)[._](\d+)"));

/// Cheap namespace check deciding whether a key belongs to this family
pub fn is_unet57_candidate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["unet", "down_blocks", "up_blocks", "mid_block"]
        .iter()
        .any(|token| lower.contains(token))
}

/// Classify a parameter name into the 57-slot layout
///
/// Returns `Ok(None)` for keys outside the namespace and an
/// [`ScanError::UnmappableTensorKey`] for keys inside it that no rule places.
pub fn classify_unet57_key(name: &str) -> Result<Option<usize>, ScanError> {
    if !is_unet57_candidate(name) {
        return Ok(None);
    }

    if let Some((index, _)) = STEM_RULES.iter().find(|(_, re)| re.is_match(name)) {
        return Ok(Some(*index));
    }

    let unmappable =
        |reason: String| ScanError::unmappable(ArchitectureFamily::Unet57, name, reason);

    if let Some(caps) = DOWN_RULE.captures(name) {
        let (stage, component, inner) = staged_parts(&caps)
            .ok_or_else(|| unmappable("bad down_blocks indices".into()))?;
        if stage >= STAGE_COUNT {
            return Err(unmappable(format!("unsupported down_blocks index {stage}")));
        }
        let offset = slot_offset(&DOWN_SLOTS, component, inner)
            .ok_or_else(|| {
                unmappable(format!("unsupported down block slot {}[{inner}]", &caps[2]))
            })?;
        return Ok(Some(DOWN_OFFSET + stage * DOWN_SLOTS.len() + offset));
    }

    if let Some(caps) = MID_RULE.captures(name) {
        let component = Component::parse(&caps[1]);
        let inner = capture_index(&caps, 2);
        let index = component
            .zip(inner)
            .and_then(|(component, inner)| slot_offset(&MID_SLOTS, component, inner))
            .ok_or_else(|| {
                unmappable(format!(
                    "unsupported mid_block slot {}[{}]",
                    &caps[1], &caps[2]
                ))
            })?;
        return Ok(Some(MID_OFFSET + index));
    }

    if let Some(caps) = UP_RULE.captures(name) {
        let (stage, component, inner) = staged_parts(&caps)
            .ok_or_else(|| unmappable("bad up_blocks indices".into()))?;
        if stage >= STAGE_COUNT {
            return Err(unmappable(format!("unsupported up_blocks index {stage}")));
        }
        let offset = slot_offset(&UP_SLOTS, component, inner)
            .ok_or_else(|| {
                unmappable(format!("unsupported up block slot {}[{inner}]", &caps[2]))
            })?;
        return Ok(Some(UP_OFFSET + stage * UP_SLOTS.len() + offset));
    }

    Err(unmappable("no 57-slot rule matches".into()))
}

/// (stage, component, inner index) from a down/up rule match
fn staged_parts(caps: &regex::Captures<'_>) -> Option<(usize, Component, usize)> {
    Some((
        capture_index(caps, 1)?,
        Component::parse(caps.get(2)?.as_str())?,
        capture_index(caps, 3)?,
    ))
}
