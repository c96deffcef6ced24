// src/checkpoint.rs
// On-disk parameter sets: a mapping from hierarchy-qualified names to
// tensor buffers, serialized with bincode. Parameter names follow the
// module tree, e.g. "conv1.weight", "layer2.0.downsample.1.running_mean".

use crate::tensor::Tensor;
use bincode::{Decode, Encode, config, decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{read, write};
use std::path::Path;

/// Error types for checkpoint and weight-loading operations
#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),
    Encode(String),
    Decode(String),
    MissingKey(String),
    UnexpectedKey(String),
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "Checkpoint I/O failed: {}", e),
            CheckpointError::Encode(msg) => write!(f, "Checkpoint encoding failed: {}", msg),
            CheckpointError::Decode(msg) => write!(f, "Checkpoint decoding failed: {}", msg),
            CheckpointError::MissingKey(key) => {
                write!(f, "Parameter '{}' not found in state dict", key)
            }
            CheckpointError::UnexpectedKey(key) => {
                write!(f, "State dict contains unknown parameter '{}'", key)
            }
            CheckpointError::ShapeMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "Shape mismatch for parameter '{}': expected {:?}, found {:?}",
                key, expected, found
            ),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Serializable tensor payload: flat f32 data plus its shape.
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct TensorBuffer {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl TensorBuffer {
    /// Create from a tensor by copying its elements
    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self {
            data: tensor.to_vec(),
            shape: tensor.shape().to_vec(),
        }
    }

    /// Convert back to a tensor
    pub fn to_tensor(&self) -> Result<Tensor, CheckpointError> {
        Tensor::from_vec(self.data.clone(), &self.shape).map_err(CheckpointError::Decode)
    }
}

/// A parameter set: hierarchy-qualified names mapped to tensor buffers.
///
/// This is the sole persisted format the backbone consumes and produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Encode, Decode)]
pub struct StateDict {
    pub tensors: HashMap<String, TensorBuffer>,
}

impl StateDict {
    pub fn new() -> Self {
        Self {
            tensors: HashMap::new(),
        }
    }

    /// Add a tensor under the given key
    pub fn insert(&mut self, key: String, tensor: &Tensor) {
        self.tensors.insert(key, TensorBuffer::from_tensor(tensor));
    }

    /// Get a buffer by key
    pub fn get(&self, key: &str) -> Option<&TensorBuffer> {
        self.tensors.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Fetch a tensor by key, checking its shape against the target
    /// parameter. Missing keys and shape mismatches are loading failures.
    pub fn take_tensor(&self, key: &str, expected: &[usize]) -> Result<Tensor, CheckpointError> {
        let buffer = self
            .get(key)
            .ok_or_else(|| CheckpointError::MissingKey(key.to_string()))?;
        if buffer.shape != expected {
            return Err(CheckpointError::ShapeMismatch {
                key: key.to_string(),
                expected: expected.to_vec(),
                found: buffer.shape.clone(),
            });
        }
        buffer.to_tensor()
    }

    /// Keep only the entries whose keys satisfy the predicate
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        Self {
            tensors: self
                .tensors
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Serialize to bytes using bincode
    pub fn save_to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        encode_to_vec(self, config::standard()).map_err(|e| CheckpointError::Encode(e.to_string()))
    }

    /// Deserialize from bytes using bincode
    pub fn load_from_bytes(data: &[u8]) -> Result<Self, CheckpointError> {
        decode_from_slice(data, config::standard())
            .map(|(val, _)| val)
            .map_err(|e| CheckpointError::Decode(e.to_string()))
    }

    /// Write the state dict to a file
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let bytes = self.save_to_bytes()?;
        write(path, bytes)?;
        Ok(())
    }

    /// Read a state dict from a file
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let bytes = read(path)?;
        Self::load_from_bytes(&bytes)
    }
}

/// Modules whose parameters and buffers participate in state dicts.
///
/// `collect_state` writes every owned tensor under `prefix`; `apply_state`
/// reads them back, failing on missing keys or shape mismatches. Composite
/// modules delegate to their children with extended prefixes.
pub trait Stateful {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict);

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError>;
}

/// Joins a hierarchy prefix with a leaf name using dots.
pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
