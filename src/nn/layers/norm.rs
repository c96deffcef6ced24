// src/nn/layers/norm.rs
// Batch normalization over the channel axis of NCHW tensors.
// Maintains running statistics for inference and supports a one-way frozen
// mode where the running statistics are used regardless of training state.

use crate::checkpoint::{CheckpointError, StateDict, Stateful, join};
use crate::nn::Module;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use ndarray::{Axis, Ix4};
use std::cell::RefCell;

/// Batch normalization layer for 4D [batch, channels, height, width] input.
///
/// Normalizes each channel using batch statistics in training mode and
/// running statistics in evaluation mode: (x - mean) / sqrt(var + eps),
/// then applies the learnable scale (gamma) and shift (beta).
#[derive(Debug)]
pub struct BatchNorm2d {
    /// Number of channels this layer normalizes
    num_features: usize,
    /// Small epsilon for numerical stability
    eps: f32,
    /// Momentum for running mean/var updates
    momentum: f32,
    /// Learnable scale parameter (gamma)
    pub weight: Parameter,
    /// Learnable shift parameter (beta)
    pub bias: Parameter,
    /// Running mean for inference (not learnable)
    pub running_mean: RefCell<Tensor>,
    /// Running variance for inference (not learnable)
    pub running_var: RefCell<Tensor>,
    /// Number of batches whose statistics were accumulated
    num_batches_tracked: RefCell<usize>,
    /// Frozen mode: statistics fixed, scale/shift non-trainable
    frozen: bool,
    /// Training mode flag
    training: bool,
}

impl BatchNorm2d {
    /// Create a new BatchNorm2d layer
    pub fn new(num_features: usize, eps: f32, momentum: f32) -> Self {
        let mut weight = Parameter::ones(&[num_features]);
        weight.set_name("weight".to_string());

        let mut bias = Parameter::zeros(&[num_features]);
        bias.set_name("bias".to_string());

        Self {
            num_features,
            eps,
            momentum,
            weight,
            bias,
            running_mean: RefCell::new(Tensor::zeros(&[num_features])),
            running_var: RefCell::new(Tensor::ones(&[num_features])),
            num_batches_tracked: RefCell::new(0),
            frozen: false,
            training: true,
        }
    }

    /// Create BatchNorm2d with default eps (1e-5) and momentum (0.1)
    pub fn new_default(num_features: usize) -> Self {
        Self::new(num_features, 1e-5, 0.1)
    }

    /// Number of channels this layer was built for.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Get the epsilon value
    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Get the momentum value
    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    /// Get the number of batches tracked
    pub fn num_batches_tracked(&self) -> usize {
        *self.num_batches_tracked.borrow()
    }

    /// Whether the layer has been frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freezes the layer: running statistics are used in every mode and the
    /// scale/shift parameters stop taking gradient updates. One-way switch.
    pub fn freeze(&mut self) {
        self.frozen = true;
        self.weight.requires_grad = false;
        self.bias.requires_grad = false;
    }

    /// Get running mean (for inspection)
    pub fn get_running_mean(&self) -> Tensor {
        self.running_mean.borrow().clone()
    }

    /// Get running variance (for inspection)
    pub fn get_running_var(&self) -> Tensor {
        self.running_var.borrow().clone()
    }

    /// Update running statistics using exponential moving average
    fn update_running_stats(&self, batch_mean: &[f32], batch_var: &[f32]) {
        {
            let mut num_batches = self.num_batches_tracked.borrow_mut();
            *num_batches += 1;
        }

        let mut running_mean = self.running_mean.borrow_mut();
        let mut running_var = self.running_var.borrow_mut();
        let mean_slice = running_mean
            .data_mut()
            .as_slice_mut()
            .expect("running mean is always contiguous");
        let var_slice = running_var
            .data_mut()
            .as_slice_mut()
            .expect("running var is always contiguous");

        for c in 0..self.num_features {
            mean_slice[c] = (1.0 - self.momentum) * mean_slice[c] + self.momentum * batch_mean[c];
            var_slice[c] = (1.0 - self.momentum) * var_slice[c] + self.momentum * batch_var[c];
        }
    }
}

impl Module for BatchNorm2d {
    /// Forward pass: normalize each channel, then scale and shift.
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let input_shape = input.shape();
        if input_shape.len() != 4 {
            return Err(format!(
                "BatchNorm2d requires 4D input [batch, channels, height, width], got shape {:?}",
                input_shape
            ));
        }
        if input_shape[1] != self.num_features {
            return Err(format!(
                "Input channels {} don't match layer channels {}",
                input_shape[1], self.num_features
            ));
        }

        let x = input
            .data()
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|e| format!("BatchNorm2d dimensionality error: {e}"))?;

        let per_channel = input_shape[0] * input_shape[2] * input_shape[3];
        if per_channel == 0 {
            return Err("BatchNorm2d input has no elements per channel".to_string());
        }

        let gamma = self.weight.data.as_slice()?;
        let beta = self.bias.data.as_slice()?;

        let use_batch_stats = self.training && !self.frozen;
        let mut out = x.to_owned();

        if use_batch_stats {
            let n = per_channel as f32;
            let mut batch_mean = vec![0.0f32; self.num_features];
            let mut batch_var = vec![0.0f32; self.num_features];

            for c in 0..self.num_features {
                let channel = x.index_axis(Axis(1), c);
                let mean = channel.sum() / n;
                // Biased variance normalizes the batch
                let var = channel.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n;

                let scale = gamma[c] / (var + self.eps).sqrt();
                let shift = beta[c] - mean * scale;
                out.index_axis_mut(Axis(1), c)
                    .mapv_inplace(|v| v * scale + shift);

                batch_mean[c] = mean;
                // Unbiased variance goes into the running estimate
                batch_var[c] = if per_channel > 1 {
                    var * n / (n - 1.0)
                } else {
                    var
                };
            }

            self.update_running_stats(&batch_mean, &batch_var);
        } else {
            let running_mean = self.running_mean.borrow();
            let running_var = self.running_var.borrow();
            let mean_slice = running_mean.as_slice()?;
            let var_slice = running_var.as_slice()?;

            for c in 0..self.num_features {
                let scale = gamma[c] / (var_slice[c] + self.eps).sqrt();
                let shift = beta[c] - mean_slice[c] * scale;
                out.index_axis_mut(Axis(1), c)
                    .mapv_inplace(|v| v * scale + shift);
            }
        }

        Ok(Tensor::new(out.into_dyn()))
    }

    /// Collect all parameters (scale and shift)
    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl Stateful for BatchNorm2d {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict) {
        dict.insert(join(prefix, "weight"), &self.weight.data);
        dict.insert(join(prefix, "bias"), &self.bias.data);
        dict.insert(join(prefix, "running_mean"), &self.running_mean.borrow());
        dict.insert(join(prefix, "running_var"), &self.running_var.borrow());
    }

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError> {
        let expected = vec![self.num_features];
        self.weight.data = dict.take_tensor(&join(prefix, "weight"), &expected)?;
        self.bias.data = dict.take_tensor(&join(prefix, "bias"), &expected)?;
        *self.running_mean.borrow_mut() =
            dict.take_tensor(&join(prefix, "running_mean"), &expected)?;
        *self.running_var.borrow_mut() =
            dict.take_tensor(&join(prefix, "running_var"), &expected)?;
        Ok(())
    }
}
