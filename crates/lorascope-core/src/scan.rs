//! Adapter scanning
//!
//! One pass over a [`TensorSource`]: classify every key without touching
//! tensor data, pick the structure the file follows, then decode and measure
//! only the tensors that structure uses.

use crate::aggregate::{BlockVector, ClassifiedTensor, StrengthAccumulator};
use crate::classify::{
    ArchitectureFamily, DOUBLE_BLOCK_COUNT, DOUBLE_SINGLE_BLOCK_COUNT, MAX_INDEXED_BLOCKS,
    SINGLE_BLOCK_COUNT, TransformerSlot, classify_transformer_key, classify_unet57_key,
    is_unet57_candidate,
};
use crate::error::{Result, ScanError};
use crate::layout::{BlockLayout, UNET_57_BLOCK_COUNT};
use crate::tensor::TensorSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{Level, debug, span};

/// Which classifier families a scan may select
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilySelection {
    /// Try every family in precedence order
    #[default]
    Auto,
    /// Transformer-style keys only
    Transformer,
    /// Fixed 57-slot keys only
    Unet57,
}

impl FamilySelection {
    fn allows(&self, family: ArchitectureFamily) -> bool {
        match self {
            Self::Auto => true,
            Self::Transformer => family == ArchitectureFamily::Transformer,
            Self::Unet57 => family == ArchitectureFamily::Unet57,
        }
    }
}

impl fmt::Display for FamilySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Transformer => "transformer",
            Self::Unet57 => "unet57",
        })
    }
}

impl FromStr for FamilySelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "transformer" => Ok(Self::Transformer),
            "unet57" | "unet_57" => Ok(Self::Unet57),
            other => Err(format!("unknown family selection: {other}")),
        }
    }
}

/// Scanner configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Families the scanner may select
    pub family: FamilySelection,
}

impl ScanConfig {
    /// Restrict the scan to one family
    pub fn with_family(mut self, family: FamilySelection) -> Self {
        self.family = family;
        self
    }
}

/// Structure a scanned file was found to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// `transformer.single_transformer_blocks.<i>`
    SingleTransformer,
    /// `lora_unet_double_blocks_<i>` / `lora_unet_single_blocks_<i>`
    DoubleSingle,
    /// `lora_te{1,2}_text_model_encoder_layers_<i>`
    TextEncoder,
    /// Fixed 57-slot UNet
    Unet57,
}

impl ScanKind {
    /// Classifier family this kind belongs to
    pub fn family(&self) -> ArchitectureFamily {
        match self {
            Self::Unet57 => ArchitectureFamily::Unet57,
            _ => ArchitectureFamily::Transformer,
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SingleTransformer => "single transformer blocks",
            Self::DoubleSingle => "double + single blocks",
            Self::TextEncoder => "text-encoder layers",
            Self::Unet57 => "UNet 57-slot",
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Outcome of scanning one adapter file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Classifier family that produced the vector
    pub family: ArchitectureFamily,
    /// Structure found in the file
    pub kind: ScanKind,
    /// Layout of the vector
    pub layout: BlockLayout,
    /// Raw and normalized block strengths
    #[serde(flatten)]
    pub vector: BlockVector,
    /// Indices that received at least one tensor, ascending
    pub block_indices: Vec<usize>,
    /// Text-encoder layer indices present in the file, ascending
    pub text_encoder_layers: Vec<usize>,
    /// Human-readable remarks about the scan
    pub notes: Vec<String>,
}

/// Keys bucketed by the structure they belong to
#[derive(Default)]
struct Buckets {
    transformer: Vec<(String, usize)>,
    double_single: Vec<(String, TransformerSlot)>,
    text_encoder: Vec<(String, usize)>,
    unet: Vec<(String, usize)>,
    unet_candidates: usize,
    unet_error: Option<ScanError>,
}

impl Buckets {
    fn classify(names: Vec<String>, selection: FamilySelection) -> Self {
        let mut buckets = Self::default();

        for name in names {
            if selection.allows(ArchitectureFamily::Unet57) && is_unet57_candidate(&name) {
                buckets.unet_candidates += 1;
                match classify_unet57_key(&name) {
                    Ok(Some(index)) => buckets.unet.push((name.clone(), index)),
                    Ok(None) => {}
                    Err(err) => {
                        buckets.unet_error.get_or_insert(err);
                    }
                }
            }

            if !selection.allows(ArchitectureFamily::Transformer) {
                continue;
            }
            match classify_transformer_key(&name) {
                Some(TransformerSlot::Transformer(i)) => buckets.transformer.push((name, i)),
                Some(slot @ (TransformerSlot::Double(_) | TransformerSlot::Single(_))) => {
                    buckets.double_single.push((name, slot))
                }
                Some(TransformerSlot::TextEncoder(i)) => buckets.text_encoder.push((name, i)),
                None => {}
            }
        }

        buckets
    }

    fn text_encoder_layers(&self) -> Vec<usize> {
        let mut layers: Vec<usize> = self.text_encoder.iter().map(|(_, i)| *i).collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }
}

/// Adapter scanner
#[derive(Debug, Clone, Default)]
pub struct AdapterScanner {
    config: ScanConfig,
}

impl AdapterScanner {
    /// Create a scanner
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan one adapter
    ///
    /// Either returns a complete [`ScanResult`] or fails; a failure never
    /// carries a partial vector.
    pub fn scan<S: TensorSource + ?Sized>(&self, source: &S) -> Result<ScanResult> {
        let mut names = source.tensor_names();
        names.sort();
        let key_count = names.len();

        let span = span!(
            Level::DEBUG,
            "scan",
            keys = key_count,
            family = %self.config.family
        );
        let _enter = span.enter();

        let buckets = Buckets::classify(names, self.config.family);
        let text_encoder_layers = buckets.text_encoder_layers();
        let mut notes = Vec::new();

        let (kind, entries, block_count) = if !buckets.transformer.is_empty() {
            let block_count = indexed_block_count(&buckets.transformer)?;
            if !text_encoder_layers.is_empty() {
                notes.push(ignored_text_encoder_note(&text_encoder_layers));
            }
            (ScanKind::SingleTransformer, buckets.transformer, block_count)
        } else if !buckets.double_single.is_empty() {
            let entries = buckets
                .double_single
                .into_iter()
                .map(|(name, slot)| match slot.double_single_index() {
                    Some(index) => Ok((name, index)),
                    None => Err(ScanError::unmappable(
                        ArchitectureFamily::Transformer,
                        &name,
                        format!(
                            "{slot:?} is outside the {DOUBLE_BLOCK_COUNT} double + {SINGLE_BLOCK_COUNT} single ordering"
                        ),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            notes.push(format!(
                "Ordered layout: double 0..{} followed by single 0..{} ({DOUBLE_SINGLE_BLOCK_COUNT} total)",
                DOUBLE_BLOCK_COUNT - 1,
                SINGLE_BLOCK_COUNT - 1
            ));
            if !text_encoder_layers.is_empty() {
                notes.push(ignored_text_encoder_note(&text_encoder_layers));
            }
            (ScanKind::DoubleSingle, entries, DOUBLE_SINGLE_BLOCK_COUNT)
        } else if buckets.unet_candidates > 0 {
            if let Some(err) = buckets.unet_error {
                return Err(err);
            }
            if !text_encoder_layers.is_empty() {
                notes.push(ignored_text_encoder_note(&text_encoder_layers));
            }
            (ScanKind::Unet57, buckets.unet, UNET_57_BLOCK_COUNT)
        } else if !buckets.text_encoder.is_empty() {
            let block_count = indexed_block_count(&buckets.text_encoder)?;
            (ScanKind::TextEncoder, buckets.text_encoder, block_count)
        } else {
            debug!(keys = key_count, "No recognised block structure");
            return Err(ScanError::UnrecognizedArchitecture { keys: key_count });
        };

        debug!(kind = %kind, tensors = entries.len(), blocks = block_count, "Selected structure");

        let layout = BlockLayout::for_scan_kind(kind, block_count).ok_or_else(|| {
            ScanError::UnrecognizedArchitecture { keys: key_count }
        })?;

        let mut accumulator = StrengthAccumulator::with_len(block_count);
        for (name, block_index) in &entries {
            let tensor = source.load(name)?;
            accumulator.add(ClassifiedTensor::new(*block_index, tensor.l2_norm()));
        }
        let block_indices = accumulator.touched_indices();
        let vector = accumulator.finish(block_count);

        notes.insert(
            0,
            format!(
                "{} detected at indices {:?}; weights normalized so the strongest block = 1.0",
                capitalize(kind.display_name()),
                block_indices
            ),
        );

        debug!(layout = %layout, blocks = block_indices.len(), "Scan complete");

        Ok(ScanResult {
            family: kind.family(),
            kind,
            layout,
            vector,
            block_indices,
            text_encoder_layers,
            notes,
        })
    }
}

/// Scan one adapter with the given configuration
pub fn scan<S: TensorSource + ?Sized>(source: &S, config: &ScanConfig) -> Result<ScanResult> {
    AdapterScanner::new(config.clone()).scan(source)
}

/// Block count implied by the largest key index, bounded by [`MAX_INDEXED_BLOCKS`]
fn indexed_block_count(entries: &[(String, usize)]) -> Result<usize> {
    let Some((name, max)) = entries.iter().max_by_key(|(_, i)| *i) else {
        return Ok(0);
    };

    max.checked_add(1)
        .filter(|&count| count <= MAX_INDEXED_BLOCKS)
        .ok_or_else(|| {
            ScanError::unmappable(
                ArchitectureFamily::Transformer,
                name,
                format!("block index {max} exceeds the {MAX_INDEXED_BLOCKS}-block limit"),
            )
        })
}

fn ignored_text_encoder_note(layers: &[usize]) -> String {
    format!("Text-encoder layers {layers:?} present but not used for block strengths")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::layout::LayoutFamily;
    use crate::tensor::{InMemorySource, TensorData};

    fn tensor(norm: f32) -> TensorData {
        TensorData::new(vec![1], vec![norm])
    }

    fn source(entries: &[(&str, f32)]) -> InMemorySource {
        entries
            .iter()
            .fold(InMemorySource::new(), |src, (name, norm)| {
                src.with_tensor(*name, tensor(*norm))
            })
    }

    #[test]
    fn test_single_transformer_blocks() {
        let src = source(&[
            ("transformer.single_transformer_blocks.0.attn.to_q.lora_A.weight", 1.0),
            ("transformer.single_transformer_blocks.0.attn.to_q.lora_B.weight", 1.0),
            ("transformer.single_transformer_blocks.3.attn.to_q.lora_A.weight", 4.0),
            ("lora_te1_text_model_encoder_layers_2_mlp_fc1.lora_up.weight", 9.0),
        ]);

        let result = scan(&src, &ScanConfig::default()).unwrap();
        assert_eq!(result.kind, ScanKind::SingleTransformer);
        assert_eq!(result.family, ArchitectureFamily::Transformer);
        assert_eq!(result.layout.identifier(), "flux_transformer_4");
        assert_eq!(result.vector.raw_strengths(), &[2.0, 0.0, 0.0, 4.0]);
        assert_eq!(result.vector.normalized_weights(), &[0.5, 0.0, 0.0, 1.0]);
        assert_eq!(result.block_indices, vec![0, 3]);
        assert_eq!(result.text_encoder_layers, vec![2]);
        assert_eq!(result.notes.len(), 2);
    }

    #[test]
    fn test_double_single_ordering() {
        let src = source(&[
            ("lora_unet_double_blocks_0_img_attn_qkv.lora_down.weight", 2.0),
            ("lora_unet_double_blocks_18_img_attn_qkv.lora_down.weight", 1.0),
            ("lora_unet_single_blocks_0_linear1.lora_down.weight", 4.0),
            ("lora_unet_single_blocks_37_linear1.lora_down.weight", 1.0),
        ]);

        let result = scan(&src, &ScanConfig::default()).unwrap();
        assert_eq!(result.kind, ScanKind::DoubleSingle);
        assert_eq!(result.layout.identifier(), "flux_double_57");
        assert_eq!(result.layout.family(), LayoutFamily::FluxDouble);
        assert_eq!(result.vector.len(), 57);
        assert_eq!(result.block_indices, vec![0, 18, 19, 56]);
        assert_eq!(result.vector.normalized_weights()[19], 1.0);
        assert_eq!(result.vector.normalized_weights()[0], 0.5);
        assert_eq!(result.vector.normalized_weights()[1], 0.0);
    }

    #[test]
    fn test_double_block_out_of_range() {
        let src = source(&[("lora_unet_double_blocks_19_img_attn_qkv.lora_down.weight", 1.0)]);
        let err = scan(&src, &ScanConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ScanError::UnmappableTensorKey {
                family: ArchitectureFamily::Transformer,
                ..
            }
        ));
    }

    #[test]
    fn test_indexed_block_count_is_bounded() {
        for key in [
            "transformer.single_transformer_blocks.18446744073709551615.attn.lora_A.weight",
            "transformer.single_transformer_blocks.1024.attn.lora_A.weight",
            "lora_te1_text_model_encoder_layers_200000000_mlp.alpha",
        ] {
            let src = source(&[(key, 1.0)]);
            match scan(&src, &ScanConfig::default()) {
                Err(ScanError::UnmappableTensorKey { key: reported, .. }) => {
                    assert_eq!(reported, key)
                }
                other => panic!("unexpected outcome for {key}: {other:?}"),
            }
        }

        let src = source(&[(
            "transformer.single_transformer_blocks.1023.attn.lora_A.weight",
            1.0,
        )]);
        let result = scan(&src, &ScanConfig::default()).unwrap();
        assert_eq!(result.layout.identifier(), "flux_transformer_1024");
        assert_eq!(result.vector.len(), MAX_INDEXED_BLOCKS);
    }

    #[test]
    fn test_unet57() {
        let src = source(&[
            ("lora_unet_conv_in.lora_down.weight", 1.0),
            ("lora_unet_mid_block_attentions_0_to_q.lora_down.weight", 3.0),
            ("lora_unet_conv_out.lora_down.weight", 1.5),
        ]);

        let result = scan(&src, &ScanConfig::default()).unwrap();
        assert_eq!(result.kind, ScanKind::Unet57);
        assert_eq!(result.family, ArchitectureFamily::Unet57);
        assert_eq!(result.layout, BlockLayout::unet_57());
        assert_eq!(result.block_indices, vec![0, 25, 56]);
        assert_eq!(result.vector.normalized_weights()[25], 1.0);
        assert_eq!(result.vector.normalized_weights()[56], 0.5);
    }

    #[test]
    fn test_unet57_drift_is_fatal() {
        let src = source(&[
            ("lora_unet_conv_in.lora_down.weight", 1.0),
            ("lora_unet_down_blocks_5_resnets_0_conv1.lora_down.weight", 1.0),
        ]);

        let err = scan(&src, &ScanConfig::default()).unwrap_err();
        match err {
            ScanError::UnmappableTensorKey { family, key, .. } => {
                assert_eq!(family, ArchitectureFamily::Unet57);
                assert_eq!(key, "lora_unet_down_blocks_5_resnets_0_conv1.lora_down.weight");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_encoder_only() {
        let src = source(&[
            ("lora_te1_text_model_encoder_layers_0_mlp_fc1.lora_up.weight", 1.0),
            ("lora_te2_text_model_encoder_layers_0_mlp_fc1.lora_up.weight", 1.0),
            ("lora_te1_text_model_encoder_layers_11_mlp_fc1.lora_up.weight", 1.0),
        ]);

        let result = scan(&src, &ScanConfig::default()).unwrap();
        assert_eq!(result.kind, ScanKind::TextEncoder);
        assert_eq!(result.layout.identifier(), "flux_te_12");
        assert_eq!(result.vector.raw_strengths()[0], 2.0);
        assert_eq!(result.vector.normalized_weights()[11], 0.5);
        assert_eq!(result.text_encoder_layers, vec![0, 11]);
    }

    #[test]
    fn test_unrecognized_architecture() {
        let src = source(&[("model.layers.0.weight", 1.0), ("bias", 1.0)]);
        let err = scan(&src, &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::UnrecognizedArchitecture { keys: 2 }));

        let empty = InMemorySource::new();
        assert!(matches!(
            scan(&empty, &ScanConfig::default()),
            Err(ScanError::UnrecognizedArchitecture { keys: 0 })
        ));
    }

    #[test]
    fn test_forced_family() {
        let src = source(&[
            ("lora_unet_conv_in.lora_down.weight", 1.0),
            ("lora_te1_text_model_encoder_layers_0_mlp_fc1.lora_up.weight", 1.0),
        ]);

        let auto = scan(&src, &ScanConfig::default()).unwrap();
        assert_eq!(auto.kind, ScanKind::Unet57);

        let forced = scan(
            &src,
            &ScanConfig::default().with_family(FamilySelection::Transformer),
        )
        .unwrap();
        assert_eq!(forced.kind, ScanKind::TextEncoder);

        let transformer_only = source(&[(
            "transformer.single_transformer_blocks.0.attn.to_q.lora_A.weight",
            1.0,
        )]);
        assert!(matches!(
            scan(
                &transformer_only,
                &ScanConfig::default().with_family(FamilySelection::Unet57)
            ),
            Err(ScanError::UnrecognizedArchitecture { keys: 1 })
        ));
    }

    #[test]
    fn test_source_errors_abort_the_scan() {
        struct Broken;

        impl TensorSource for Broken {
            fn tensor_names(&self) -> Vec<String> {
                vec!["lora_unet_conv_in.lora_down.weight".to_string()]
            }

            fn load(&self, name: &str) -> std::result::Result<TensorData, SourceError> {
                Err(SourceError::UnsupportedDtype {
                    name: name.to_string(),
                    dtype: "BOOL".to_string(),
                })
            }
        }

        assert!(matches!(
            scan(&Broken, &ScanConfig::default()),
            Err(ScanError::Source(SourceError::UnsupportedDtype { .. }))
        ));
    }

    #[test]
    fn test_only_selected_tensors_are_decoded() {
        struct NamesOnly;

        impl TensorSource for NamesOnly {
            fn tensor_names(&self) -> Vec<String> {
                vec![
                    "transformer.single_transformer_blocks.1.proj_out.lora_A.weight".to_string(),
                    "unrelated.metadata".to_string(),
                ]
            }

            fn load(&self, name: &str) -> std::result::Result<TensorData, SourceError> {
                if name.starts_with("transformer.") {
                    Ok(TensorData::new(vec![2], vec![3.0, 4.0]))
                } else {
                    Err(SourceError::NotFound(name.to_string()))
                }
            }
        }

        let result = scan(&NamesOnly, &ScanConfig::default()).unwrap();
        assert_eq!(result.vector.raw_strengths(), &[0.0, 5.0]);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let entries: Vec<(String, f32)> = (0..40)
            .map(|i| {
                (
                    format!(
                        "transformer.single_transformer_blocks.{}.attn.to_k.lora_A.weight",
                        i % 7
                    ),
                    0.1 + i as f32 * 0.37,
                )
            })
            .collect();
        let refs: Vec<(&str, f32)> = entries.iter().map(|(n, v)| (n.as_str(), *v)).collect();

        let first = scan(&source(&refs), &ScanConfig::default()).unwrap();
        for _ in 0..5 {
            assert_eq!(scan(&source(&refs), &ScanConfig::default()).unwrap(), first);
        }
    }

    #[test]
    fn test_result_serialization() {
        let src = source(&[("lora_unet_conv_in.lora_down.weight", 2.0)]);
        let result = scan(&src, &ScanConfig::default()).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["layout"], "unet_57");
        assert_eq!(json["kind"], "unet57");
        assert_eq!(json["family"], "unet57");
        assert_eq!(json["block_weights"][0], 1.0);
        assert_eq!(json["raw_block_strengths"].as_array().unwrap().len(), 57);

        let back: ScanResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_family_selection_parsing() {
        assert_eq!("AUTO".parse::<FamilySelection>().unwrap(), FamilySelection::Auto);
        assert_eq!("unet_57".parse::<FamilySelection>().unwrap(), FamilySelection::Unet57);
        assert!("sdxl".parse::<FamilySelection>().is_err());
    }
}
