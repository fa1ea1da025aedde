//! Safetensors-backed tensor source

use crate::error::SourceError;
use crate::tensor::{DataType, TensorData, TensorSource};
use half::{bf16, f16};
use safetensors::{Dtype, SafeTensors};

/// Tensor source over a borrowed safetensors buffer
///
/// The caller owns the bytes (read from disk, mmapped, downloaded); this
/// type only parses the header and decodes tensors on demand.
pub struct SafetensorsSource<'data> {
    tensors: SafeTensors<'data>,
}

impl<'data> SafetensorsSource<'data> {
    /// Parse a safetensors buffer
    pub fn from_bytes(buffer: &'data [u8]) -> Result<Self, SourceError> {
        let tensors =
            SafeTensors::deserialize(buffer).map_err(|e| SourceError::Format(e.to_string()))?;
        Ok(Self { tensors })
    }

    /// Number of tensors in the buffer
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if the buffer holds no tensors
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl TensorSource for SafetensorsSource<'_> {
    fn tensor_names(&self) -> Vec<String> {
        self.tensors
            .names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn load(&self, name: &str) -> Result<TensorData, SourceError> {
        let view = self
            .tensors
            .tensor(name)
            .map_err(|_| SourceError::NotFound(name.to_string()))?;
        let (dtype, values) = decode(name, view.dtype(), view.data())?;

        Ok(TensorData {
            dtype,
            shape: view.shape().to_vec(),
            values,
        })
    }
}

/// Widen little-endian tensor bytes to f32
fn decode(name: &str, dtype: Dtype, data: &[u8]) -> Result<(DataType, Vec<f32>), SourceError> {
    let decoded = match dtype {
        Dtype::F32 => (
            DataType::Float32,
            data.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Dtype::F64 => (
            DataType::Float64,
            data.chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
        ),
        Dtype::F16 => (
            DataType::Float16,
            data.chunks_exact(2)
                .map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
                .collect(),
        ),
        Dtype::BF16 => (
            DataType::BFloat16,
            data.chunks_exact(2)
                .map(|c| bf16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
                .collect(),
        ),
        Dtype::I64 => (
            DataType::Int64,
            data.chunks_exact(8)
                .map(|c| {
                    i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
        ),
        Dtype::I32 => (
            DataType::Int32,
            data.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
        ),
        Dtype::I16 => (
            DataType::Int16,
            data.chunks_exact(2)
                .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])))
                .collect(),
        ),
        Dtype::I8 => (
            DataType::Int8,
            data.iter().map(|&b| f32::from(b as i8)).collect(),
        ),
        Dtype::U8 => (DataType::UInt8, data.iter().map(|&b| f32::from(b)).collect()),
        other => {
            return Err(SourceError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{other:?}"),
            });
        }
    };

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::tensor::TensorView;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn serialize(tensors: &[(&str, Dtype, Vec<usize>, Vec<u8>)]) -> Vec<u8> {
        let views: Vec<(&str, TensorView<'_>)> = tensors
            .iter()
            .map(|(name, dtype, shape, data)| {
                (*name, TensorView::new(*dtype, shape.clone(), data).unwrap())
            })
            .collect();
        safetensors::serialize(views.iter().map(|(k, v)| (*k, v)), None).unwrap()
    }

    #[test]
    fn test_reads_f32_tensors() {
        let buffer = serialize(&[(
            "layer.weight",
            Dtype::F32,
            vec![2, 2],
            f32_bytes(&[1.0, 2.0, 3.0, 4.0]),
        )]);

        let source = SafetensorsSource::from_bytes(&buffer).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.tensor_names(), vec!["layer.weight".to_string()]);

        let tensor = source.load("layer.weight").unwrap();
        assert_eq!(tensor.dtype, DataType::Float32);
        assert_eq!(tensor.shape, vec![2, 2]);
        assert_eq!(tensor.values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_reads_half_precision() {
        let half: Vec<u8> = [1.5f32, -2.0]
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_bits().to_le_bytes())
            .collect();
        let brain: Vec<u8> = [0.5f32, 4.0]
            .iter()
            .flat_map(|&v| bf16::from_f32(v).to_bits().to_le_bytes())
            .collect();
        let buffer = serialize(&[
            ("a", Dtype::F16, vec![2], half),
            ("b", Dtype::BF16, vec![2], brain),
        ]);

        let source = SafetensorsSource::from_bytes(&buffer).unwrap();
        let a = source.load("a").unwrap();
        assert_eq!(a.dtype, DataType::Float16);
        assert_eq!(a.values, vec![1.5, -2.0]);

        let b = source.load("b").unwrap();
        assert_eq!(b.dtype, DataType::BFloat16);
        assert_eq!(b.values, vec![0.5, 4.0]);
    }

    #[test]
    fn test_unsupported_dtype() {
        let buffer = serialize(&[("flag", Dtype::BOOL, vec![2], vec![0, 1])]);
        let source = SafetensorsSource::from_bytes(&buffer).unwrap();
        assert!(matches!(
            source.load("flag"),
            Err(SourceError::UnsupportedDtype { .. })
        ));
    }

    #[test]
    fn test_missing_tensor() {
        let buffer = serialize(&[("a", Dtype::U8, vec![1], vec![7])]);
        let source = SafetensorsSource::from_bytes(&buffer).unwrap();
        assert_eq!(source.load("a").unwrap().values, vec![7.0]);
        assert!(matches!(source.load("b"), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            SafetensorsSource::from_bytes(&[1, 2, 3]),
            Err(SourceError::Format(_))
        ));
    }
}
