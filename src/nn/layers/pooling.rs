// src/nn/layers/pooling.rs
// Windowed 2D max pooling over NCHW tensors.
// Padded positions never contribute: the accumulator starts at f32::MIN and
// only in-bounds values are considered.

use crate::nn::Module;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use ndarray::{ArrayD, IxDyn};

/// 2D max pooling layer: applies max pooling over spatial dimensions.
/// Input shape: [batch_size, channels, height, width]
/// Output shape: [batch_size, channels, pooled_height, pooled_width]
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    /// Pooling window size (height, width)
    kernel_size: (usize, usize),
    /// Stride for the pooling operation (height, width)
    stride: (usize, usize),
    /// Padding for the pooling operation (height, width)
    padding: (usize, usize),
    /// Training mode flag
    training: bool,
}

impl MaxPool2d {
    /// Create a new MaxPool2d layer. Stride defaults to the kernel size.
    pub fn new(
        kernel_size: (usize, usize),
        stride: Option<(usize, usize)>,
        padding: (usize, usize),
    ) -> Self {
        let stride = stride.unwrap_or(kernel_size);

        Self {
            kernel_size,
            stride,
            padding,
            training: true,
        }
    }

    /// Create MaxPool2d with a square kernel.
    pub fn new_square(kernel_size: usize, stride: Option<usize>, padding: usize) -> Self {
        let stride_2d = stride.map(|s| (s, s)).unwrap_or((kernel_size, kernel_size));
        Self::new(
            (kernel_size, kernel_size),
            Some(stride_2d),
            (padding, padding),
        )
    }

    /// Calculate output dimensions after pooling
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, String> {
        if input_shape.len() != 4 {
            return Err("MaxPool2d requires 4D input [batch, channels, height, width]".to_string());
        }

        let batch_size = input_shape[0];
        let channels = input_shape[1];
        let input_height = input_shape[2];
        let input_width = input_shape[3];

        if input_height + 2 * self.padding.0 < self.kernel_size.0
            || input_width + 2 * self.padding.1 < self.kernel_size.1
        {
            return Err(format!(
                "Pooling window {:?} does not fit input {}x{} with padding {:?}",
                self.kernel_size, input_height, input_width, self.padding
            ));
        }

        let output_height =
            (input_height + 2 * self.padding.0 - self.kernel_size.0) / self.stride.0 + 1;
        let output_width =
            (input_width + 2 * self.padding.1 - self.kernel_size.1) / self.stride.1 + 1;

        Ok(vec![batch_size, channels, output_height, output_width])
    }
}

impl Module for MaxPool2d {
    /// Forward pass: apply windowed max pooling.
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let input_shape = input.shape();
        let output_shape = self.output_shape(input_shape)?;

        let (n, c, h, w) = (
            input_shape[0],
            input_shape[1],
            input_shape[2],
            input_shape[3],
        );
        let (h_out, w_out) = (output_shape[2], output_shape[3]);

        let input_slice = input.as_slice()?;
        let mut output_data = vec![0.0f32; n * c * h_out * w_out];

        for batch in 0..n {
            for channel in 0..c {
                for out_h in 0..h_out {
                    for out_w in 0..w_out {
                        let h_start = (out_h * self.stride.0) as i32 - self.padding.0 as i32;
                        let w_start = (out_w * self.stride.1) as i32 - self.padding.1 as i32;

                        let mut max_val = f32::MIN;

                        for kh in 0..self.kernel_size.0 {
                            for kw in 0..self.kernel_size.1 {
                                let h_pos = h_start + kh as i32;
                                let w_pos = w_start + kw as i32;

                                let is_valid = h_pos >= 0
                                    && h_pos < h as i32
                                    && w_pos >= 0
                                    && w_pos < w as i32;

                                if is_valid {
                                    let input_idx = batch * (c * h * w)
                                        + channel * (h * w)
                                        + (h_pos as usize) * w
                                        + (w_pos as usize);

                                    let val = input_slice[input_idx];
                                    if val > max_val {
                                        max_val = val;
                                    }
                                }
                            }
                        }

                        let output_idx = batch * (c * h_out * w_out)
                            + channel * (h_out * w_out)
                            + out_h * w_out
                            + out_w;

                        output_data[output_idx] = max_val;
                    }
                }
            }
        }

        ArrayD::from_shape_vec(IxDyn(&[n, c, h_out, w_out]), output_data)
            .map(Tensor::new)
            .map_err(|e| format!("Failed to create output tensor: {e}"))
    }

    /// MaxPool2d has no parameters
    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    fn training(&self) -> bool {
        self.training
    }

    /// Set training mode (no effect for MaxPool2d)
    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
