// src/nn/layers/conv2d.rs
// 2D convolutional layer, evaluated directly on CPU tensors.
// Convolution is computed as im2col followed by a single GEMM.

use crate::checkpoint::{CheckpointError, StateDict, Stateful, join};
use crate::nn::Module;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use ndarray::{Array2, ArrayD, IxDyn};

/// 2D convolutional layer: applies convolution over an input tensor.
/// Weight tensor has shape [out_channels, in_channels, kernel_height, kernel_width].
#[derive(Debug)]
pub struct Conv2d {
    /// Weight tensor [out_channels, in_channels, kernel_height, kernel_width]
    pub weight: Parameter,
    /// Optional bias vector [out_channels]
    pub bias: Option<Parameter>,
    /// Number of input channels
    pub in_channels: usize,
    /// Number of output channels
    pub out_channels: usize,
    /// Kernel size (height, width)
    pub kernel_size: (usize, usize),
    /// Stride (height, width)
    pub stride: (usize, usize),
    /// Padding (height, width)
    pub padding: (usize, usize),
    /// Training mode flag
    training: bool,
}

impl Conv2d {
    /// Create a new 2D convolutional layer
    /// Initializes weights with Kaiming uniform distribution for ReLU activations
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        bias: bool,
    ) -> Self {
        let weight_shape = [out_channels, in_channels, kernel_size.0, kernel_size.1];
        let mut weight = Parameter::kaiming_uniform(&weight_shape);
        weight.set_name("weight".to_string());

        let bias_param = if bias {
            let mut b = Parameter::zeros(&[out_channels]);
            b.set_name("bias".to_string());
            Some(b)
        } else {
            None
        };

        Self {
            weight,
            bias: bias_param,
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            training: true,
        }
    }

    /// Create a convolutional layer with a square kernel.
    pub fn new_square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        Self::new(
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (stride, stride),
            (padding, padding),
            bias,
        )
    }

    /// Check if layer has bias
    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    /// Calculate output dimensions given input dimensions
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>, String> {
        if input_shape.len() != 4 {
            return Err("Input must be 4D [batch, channels, height, width]".to_string());
        }

        let batch_size = input_shape[0];
        let input_height = input_shape[2];
        let input_width = input_shape[3];

        if input_height + 2 * self.padding.0 < self.kernel_size.0
            || input_width + 2 * self.padding.1 < self.kernel_size.1
        {
            return Err(format!(
                "Kernel {:?} does not fit input {}x{} with padding {:?}",
                self.kernel_size, input_height, input_width, self.padding
            ));
        }

        let output_height =
            (input_height + 2 * self.padding.0 - self.kernel_size.0) / self.stride.0 + 1;
        let output_width =
            (input_width + 2 * self.padding.1 - self.kernel_size.1) / self.stride.1 + 1;

        Ok(vec![batch_size, self.out_channels, output_height, output_width])
    }

    /// Convert image patches to a column matrix (im2col).
    /// This transforms the 4D convolution into one 2D matrix multiplication.
    fn im2col(&self, input: &Tensor) -> Result<Array2<f32>, String> {
        let input_shape = input.shape();
        let (batch, channels, in_h, in_w) = (
            input_shape[0],
            input_shape[1],
            input_shape[2],
            input_shape[3],
        );
        let (kernel_h, kernel_w) = self.kernel_size;
        let (stride_h, stride_w) = self.stride;
        let (pad_h, pad_w) = self.padding;

        let out_h = (in_h + 2 * pad_h - kernel_h) / stride_h + 1;
        let out_w = (in_w + 2 * pad_w - kernel_w) / stride_w + 1;

        let col_height = channels * kernel_h * kernel_w;
        let col_width = batch * out_h * out_w;

        let input_data = input.as_slice()?;
        let mut col_data = vec![0.0f32; col_height * col_width];

        // Extract patches and arrange them as columns for matrix multiplication
        for b in 0..batch {
            for c in 0..channels {
                for ky in 0..kernel_h {
                    for kx in 0..kernel_w {
                        let col_row = c * kernel_h * kernel_w + ky * kernel_w + kx;

                        for out_y in 0..out_h {
                            for out_x in 0..out_w {
                                let in_y = out_y * stride_h + ky;
                                let in_x = out_x * stride_w + kx;
                                let col_col = b * out_h * out_w + out_y * out_w + out_x;

                                // Handle padding by checking bounds
                                if in_y >= pad_h && in_x >= pad_w {
                                    let actual_y = in_y - pad_h;
                                    let actual_x = in_x - pad_w;

                                    if actual_y < in_h && actual_x < in_w {
                                        let input_idx = b * (channels * in_h * in_w)
                                            + c * (in_h * in_w)
                                            + actual_y * in_w
                                            + actual_x;
                                        col_data[col_row * col_width + col_col] =
                                            input_data[input_idx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Array2::from_shape_vec((col_height, col_width), col_data)
            .map_err(|e| format!("Failed to create im2col matrix: {e}"))
    }
}

impl Module for Conv2d {
    /// Forward pass: apply 2D convolution to the input tensor.
    /// Input shape: [batch_size, in_channels, height, width]
    /// Output shape: [batch_size, out_channels, out_height, out_width]
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let input_shape = input.shape();
        if input_shape.len() != 4 {
            return Err(format!(
                "Conv2d requires 4D input [batch, channels, height, width], got shape {:?}",
                input_shape
            ));
        }

        let input_channels = input_shape[1];
        if input_channels != self.in_channels {
            return Err(format!(
                "Input channels {} don't match layer channels {}",
                input_channels, self.in_channels
            ));
        }

        let output_shape = self.output_shape(input_shape)?;
        let (batch, out_h, out_w) = (output_shape[0], output_shape[2], output_shape[3]);
        let (kernel_h, kernel_w) = self.kernel_size;

        // Transform input to a column matrix for one GEMM
        let col_matrix = self.im2col(input)?;

        // Reshape filter to [out_channels, in_channels * kh * kw]
        let filter_2d: Array2<f32> = self
            .weight
            .data
            .data()
            .clone()
            .into_shape_with_order((
                self.out_channels,
                self.in_channels * kernel_h * kernel_w,
            ))
            .map_err(|e| format!("Filter reshape failed: {e}"))?;

        // Perform convolution as matrix multiplication: filter @ col_matrix
        let output_2d = filter_2d.dot(&col_matrix);

        // Rearrange from [out_channels, batch * out_h * out_w] to
        // [batch, out_channels, out_h, out_w]
        let output_data = output_2d
            .as_slice()
            .ok_or("Failed to get contiguous output data")?;
        let mut final_output = vec![0.0f32; batch * self.out_channels * out_h * out_w];

        for out_c in 0..self.out_channels {
            for b in 0..batch {
                for y in 0..out_h {
                    for x in 0..out_w {
                        let src_idx =
                            out_c * (batch * out_h * out_w) + b * (out_h * out_w) + y * out_w + x;
                        let dst_idx = b * (self.out_channels * out_h * out_w)
                            + out_c * (out_h * out_w)
                            + y * out_w
                            + x;
                        final_output[dst_idx] = output_data[src_idx];
                    }
                }
            }
        }

        let mut output = ArrayD::from_shape_vec(
            IxDyn(&[batch, self.out_channels, out_h, out_w]),
            final_output,
        )
        .map_err(|e| format!("Failed to create output tensor: {e}"))?;

        if let Some(ref bias) = self.bias {
            let bias_data = bias.data.as_slice()?;
            for (c, channel_bias) in bias_data.iter().enumerate().take(self.out_channels) {
                output
                    .index_axis_mut(ndarray::Axis(1), c)
                    .mapv_inplace(|v| v + channel_bias);
            }
        }

        Ok(Tensor::new(output))
    }

    /// Collect all parameters (weight and optional bias)
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = vec![&self.weight];
        if let Some(ref bias) = self.bias {
            params.push(bias);
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = vec![&mut self.weight];
        if let Some(ref mut bias) = self.bias {
            params.push(bias);
        }
        params
    }

    fn training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl Stateful for Conv2d {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict) {
        dict.insert(join(prefix, "weight"), &self.weight.data);
        if let Some(ref bias) = self.bias {
            dict.insert(join(prefix, "bias"), &bias.data);
        }
    }

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError> {
        let weight_shape = self.weight.shape().to_vec();
        self.weight.data = dict.take_tensor(&join(prefix, "weight"), &weight_shape)?;
        if let Some(ref mut bias) = self.bias {
            let bias_shape = bias.shape().to_vec();
            bias.data = dict.take_tensor(&join(prefix, "bias"), &bias_shape)?;
        }
        Ok(())
    }
}
