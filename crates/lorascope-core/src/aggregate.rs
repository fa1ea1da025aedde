//! Per-block strength aggregation

use serde::{Deserialize, Serialize};

/// Decimal places kept in normalized block weights
pub const NORMALIZED_DIGITS: u32 = 6;

/// One classified parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedTensor {
    /// Canonical block index
    pub block_index: usize,
    /// L2 norm of the parameter's values
    pub magnitude: f64,
}

impl ClassifiedTensor {
    pub fn new(block_index: usize, magnitude: f64) -> Self {
        Self {
            block_index,
            magnitude,
        }
    }
}

/// Raw and max-normalized per-block strengths of one adapter
///
/// Built once per scan and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockVector {
    #[serde(rename = "raw_block_strengths")]
    raw_strengths: Vec<f64>,
    #[serde(rename = "block_weights")]
    normalized_weights: Vec<f64>,
}

impl BlockVector {
    /// Build from raw per-block sums
    ///
    /// Weights are divided by the maximum and rounded to six places. An
    /// all-zero (or empty) raw vector normalizes to all zeros.
    pub fn from_raw(raw_strengths: Vec<f64>) -> Self {
        let max = raw_strengths.iter().copied().fold(0.0_f64, f64::max);
        let normalized_weights = if max > 0.0 {
            raw_strengths
                .iter()
                .map(|v| round_to(v / max, NORMALIZED_DIGITS))
                .collect()
        } else {
            vec![0.0; raw_strengths.len()]
        };

        Self {
            raw_strengths,
            normalized_weights,
        }
    }

    /// Per-block magnitude sums
    pub fn raw_strengths(&self) -> &[f64] {
        &self.raw_strengths
    }

    /// Weights in [0, 1], strongest block = 1.0
    pub fn normalized_weights(&self) -> &[f64] {
        &self.normalized_weights
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.raw_strengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_strengths.is_empty()
    }

    /// Consume into the normalized weights
    pub fn into_weights(self) -> Vec<f64> {
        self.normalized_weights
    }
}

/// Round to `digits` decimal places
///
/// Rounds the exact binary value through its fixed-point decimal rendering,
/// so `1.00005` (stored just below the midpoint) becomes `1.0`.
pub fn round_to(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.*}", digits as usize, value)
        .parse()
        .unwrap_or(value)
}

/// Running per-index magnitude sums
#[derive(Debug, Clone, Default)]
pub struct StrengthAccumulator {
    sums: Vec<f64>,
    touched: Vec<bool>,
}

impl StrengthAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for a known block count
    pub fn with_len(block_count: usize) -> Self {
        Self {
            sums: vec![0.0; block_count],
            touched: vec![false; block_count],
        }
    }

    /// Add one classified tensor, growing the vector if needed
    pub fn add(&mut self, tensor: ClassifiedTensor) {
        let index = tensor.block_index;
        if index >= self.sums.len() {
            self.sums.resize(index + 1, 0.0);
            self.touched.resize(index + 1, false);
        }
        self.sums[index] += tensor.magnitude;
        self.touched[index] = true;
    }

    /// Current length (highest touched index + 1, or the pre-sized count)
    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Indices that received at least one tensor, ascending
    pub fn touched_indices(&self) -> Vec<usize> {
        self.touched
            .iter()
            .enumerate()
            .filter_map(|(i, &t)| t.then_some(i))
            .collect()
    }

    /// Finish into a block vector of `block_count` entries
    ///
    /// Zero-fills missing trailing indices; `block_count` must be at least
    /// the accumulated length, extra sums are otherwise dropped.
    pub fn finish(mut self, block_count: usize) -> BlockVector {
        self.sums.resize(block_count, 0.0);
        BlockVector::from_raw(self.sums)
    }
}

/// Aggregate classified tensors into a block vector of `block_count` entries
///
/// Tensors whose index falls outside `0..block_count` are ignored; classifiers
/// never produce them.
pub fn aggregate<I>(tensors: I, block_count: usize) -> BlockVector
where
    I: IntoIterator<Item = ClassifiedTensor>,
{
    let mut accumulator = StrengthAccumulator::with_len(block_count);
    for tensor in tensors {
        if tensor.block_index < block_count {
            accumulator.add(tensor);
        }
    }
    accumulator.finish(block_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sums_per_index() {
        let vector = aggregate(
            [
                ClassifiedTensor::new(0, 1.0),
                ClassifiedTensor::new(2, 2.0),
                ClassifiedTensor::new(2, 2.0),
            ],
            4,
        );

        assert_eq!(vector.raw_strengths(), &[1.0, 0.0, 4.0, 0.0]);
        assert_eq!(vector.normalized_weights(), &[0.25, 0.0, 1.0, 0.0]);
        assert_eq!(vector.len(), 4);
    }

    #[test]
    fn test_max_is_exactly_one() {
        let vector = aggregate(
            [
                ClassifiedTensor::new(0, 0.3),
                ClassifiedTensor::new(1, 0.7),
                ClassifiedTensor::new(2, 0.7 / 3.0),
            ],
            3,
        );
        let max = vector
            .normalized_weights()
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        assert_eq!(max, 1.0);
        assert_eq!(vector.normalized_weights()[0], 0.428571);
        assert_eq!(vector.normalized_weights()[2], 0.333333);
    }

    #[test]
    fn test_all_zero_normalizes_to_zero() {
        let vector = aggregate([ClassifiedTensor::new(1, 0.0)], 3);
        assert_eq!(vector.normalized_weights(), &[0.0, 0.0, 0.0]);
        assert!(vector.normalized_weights().iter().all(|w| !w.is_nan()));

        let empty = BlockVector::from_raw(Vec::new());
        assert!(empty.is_empty());
        assert!(empty.normalized_weights().is_empty());
    }

    #[test]
    fn test_accumulator_grows_and_tracks_indices() {
        let mut acc = StrengthAccumulator::new();
        acc.add(ClassifiedTensor::new(5, 1.0));
        acc.add(ClassifiedTensor::new(1, 2.0));
        assert_eq!(acc.len(), 6);
        assert_eq!(acc.touched_indices(), vec![1, 5]);

        let vector = acc.finish(8);
        assert_eq!(vector.len(), 8);
        assert_eq!(vector.raw_strengths()[7], 0.0);
        assert_eq!(vector.normalized_weights()[1], 1.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123_456_78, 6), 0.123457);
        assert_eq!(round_to(0.5, 4), 0.5);
        assert_eq!(round_to(2.0 / 3.0, 4), 0.6667);
        assert_eq!(round_to(-0.00001, 4), 0.0);
    }

    #[test]
    fn test_round_to_uses_exact_binary_value() {
        assert_eq!(round_to(1.00005, 4), 1.0);
        assert_eq!(round_to(2.675, 2), 2.67);
        assert_eq!(round_to(0.000_000_7, 6), 0.000001);
        assert!(round_to(f64::NAN, 4).is_nan());
    }

    #[test]
    fn test_serialized_field_names() {
        let vector = BlockVector::from_raw(vec![2.0, 1.0]);
        let json = serde_json::to_value(&vector).unwrap();
        assert_eq!(json["block_weights"], serde_json::json!([1.0, 0.5]));
        assert_eq!(json["raw_block_strengths"], serde_json::json!([2.0, 1.0]));
    }
}
