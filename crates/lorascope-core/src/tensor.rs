//! Tensor source abstraction
//!
//! The scanner never opens files. A [`TensorSource`] hands it parameter names
//! and, on request, the decoded values behind each name.

use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Element type of a stored tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Float64,
    Float32,
    Float16,
    BFloat16,
    Int64,
    Int32,
    Int16,
    Int8,
    UInt8,
}

/// Decoded tensor values
///
/// Values are widened to `f32` whatever the stored dtype; `dtype` records
/// what the file actually held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Stored element type
    pub dtype: DataType,
    /// Tensor shape
    pub shape: Vec<usize>,
    /// Flattened values
    pub values: Vec<f32>,
}

impl TensorData {
    /// Create f32 tensor data
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self {
            dtype: DataType::Float32,
            shape,
            values,
        }
    }

    /// Set the stored dtype
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.values.len()
    }

    /// L2 (Frobenius) norm, accumulated in f64
    pub fn l2_norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| {
                let v = f64::from(v);
                v * v
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// A named tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    /// Parameter name
    pub name: String,
    /// Decoded data
    pub tensor: TensorData,
}

/// Supplier of (parameter name, tensor) pairs for one adapter file
pub trait TensorSource {
    /// All parameter names, without decoding any data
    fn tensor_names(&self) -> Vec<String>;

    /// Decode the tensor stored under `name`
    fn load(&self, name: &str) -> Result<TensorData, SourceError>;

    /// Iterate every (name, tensor) pair in name order
    fn tensors(&self) -> Box<dyn Iterator<Item = Result<NamedTensor, SourceError>> + '_> {
        let mut names = self.tensor_names();
        names.sort();
        Box::new(names.into_iter().map(move |name| {
            let tensor = self.load(&name)?;
            Ok(NamedTensor { name, tensor })
        }))
    }
}

/// Tensor source backed by decoded tensors held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tensors: HashMap<String, TensorData>,
}

impl InMemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tensor, replacing any previous tensor with the same name
    pub fn insert(&mut self, name: impl Into<String>, tensor: TensorData) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Add a tensor (builder form)
    pub fn with_tensor(mut self, name: impl Into<String>, tensor: TensorData) -> Self {
        self.insert(name, tensor);
        self
    }

    /// Number of tensors
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<NamedTensor> for InMemorySource {
    fn from_iter<I: IntoIterator<Item = NamedTensor>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().map(|t| (t.name, t.tensor)).collect(),
        }
    }
}

impl TensorSource for InMemorySource {
    fn tensor_names(&self) -> Vec<String> {
        self.tensors.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> Result<TensorData, SourceError> {
        self.tensors
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}
