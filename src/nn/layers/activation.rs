// src/nn/layers/activation.rs
// Element-wise activation layers.

use crate::nn::Module;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;

/// ReLU activation layer: f(x) = max(0, x)
#[derive(Debug, Clone)]
pub struct ReLU {
    /// Training mode flag (not used for ReLU but required by Module trait)
    training: bool,
}

impl ReLU {
    /// Create a new ReLU activation layer
    pub fn new() -> Self {
        Self { training: true }
    }
}

impl Default for ReLU {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ReLU {
    /// Forward pass: apply ReLU element-wise.
    /// Input/Output shape: any shape - activation is applied element-wise
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        Ok(Tensor::new(input.data().mapv(|v| v.max(0.0))))
    }

    /// ReLU has no parameters
    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    fn training(&self) -> bool {
        self.training
    }

    /// Set training mode (no effect for ReLU)
    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
