#[cfg(test)]
mod tests {

    use crate::nn::layers::*;
    use crate::nn::module::Module;
    use crate::tensor::Tensor;
    use approx::assert_relative_eq;

    // ============================================================================
    // CONV2D LAYER TESTS
    // ============================================================================

    #[test]
    fn test_conv2d_output_dimensions() {
        // (in_c, out_c, kernel, stride, padding, side, expected_side)
        let test_cases = vec![
            (3, 64, 7, 2, 3, 64, 32), // stem configuration
            (64, 64, 3, 1, 1, 16, 16),
            (64, 128, 3, 2, 1, 16, 8),
            (64, 128, 1, 2, 0, 16, 8), // projection shortcut
        ];

        for (in_c, out_c, kernel, stride, padding, side, expected) in test_cases {
            let conv = Conv2d::new_square(in_c, out_c, kernel, stride, padding, false);
            let input = Tensor::zeros(&[2, in_c, side, side]);
            let output = conv.forward(&input).unwrap();

            assert_eq!(
                output.shape(),
                &[2, out_c, expected, expected],
                "Failed for case: {}x{} kernel {} stride {} padding {}",
                in_c,
                out_c,
                kernel,
                stride,
                padding
            );
        }
    }

    #[test]
    fn test_conv2d_mathematical_correctness() {
        // 2x2 kernel of ones over a constant input: every output element is
        // the sum of a full window
        let mut conv = Conv2d::new(1, 1, (2, 2), (1, 1), (0, 0), false);
        conv.weight.data = Tensor::ones(&[1, 1, 2, 2]);

        let input = Tensor::from_vec(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            &[1, 1, 3, 3],
        )
        .unwrap();

        let output = conv.forward(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 2, 2]);

        // Window sums: [1+2+4+5, 2+3+5+6, 4+5+7+8, 5+6+8+9]
        let expected = [12.0, 16.0, 24.0, 28.0];
        let result = output.as_slice().unwrap();
        for (got, want) in result.iter().zip(expected.iter()) {
            assert_relative_eq!(*got, *want, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_conv2d_padding_contribution() {
        // 3x3 ones kernel with padding 1: corner output only sees 4 input
        // elements, center sees all 9
        let mut conv = Conv2d::new(1, 1, (3, 3), (1, 1), (1, 1), false);
        conv.weight.data = Tensor::ones(&[1, 1, 3, 3]);

        let input = Tensor::ones(&[1, 1, 3, 3]);
        let output = conv.forward(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 3, 3]);

        let result = output.as_slice().unwrap();
        assert_relative_eq!(result[0], 4.0, max_relative = 1e-6); // corner
        assert_relative_eq!(result[1], 6.0, max_relative = 1e-6); // edge
        assert_relative_eq!(result[4], 9.0, max_relative = 1e-6); // center
    }

    #[test]
    fn test_conv2d_bias_effect() {
        let mut conv = Conv2d::new(1, 2, (1, 1), (1, 1), (0, 0), true);
        conv.weight.data = Tensor::zeros(&[2, 1, 1, 1]);
        conv.bias.as_mut().unwrap().data = Tensor::from_vec(vec![1.5, -0.5], &[2]).unwrap();

        let input = Tensor::ones(&[1, 1, 2, 2]);
        let output = conv.forward(&input).unwrap();

        let result = output.as_slice().unwrap();
        // First output channel is all bias[0], second all bias[1]
        for v in &result[..4] {
            assert_relative_eq!(*v, 1.5, max_relative = 1e-6);
        }
        for v in &result[4..] {
            assert_relative_eq!(*v, -0.5, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_conv2d_rejects_channel_mismatch() {
        let conv = Conv2d::new_square(3, 8, 3, 1, 1, false);
        let input = Tensor::zeros(&[1, 4, 8, 8]);
        assert!(conv.forward(&input).is_err());
    }

    #[test]
    fn test_conv2d_rejects_non_4d_input() {
        let conv = Conv2d::new_square(3, 8, 3, 1, 1, false);
        let input = Tensor::zeros(&[3, 8, 8]);
        assert!(conv.forward(&input).is_err());
    }

    // ============================================================================
    // MAX POOLING TESTS
    // ============================================================================

    #[test]
    fn test_maxpool2d_window_values() {
        let pool = MaxPool2d::new_square(2, None, 0);

        let input = Tensor::from_vec(
            vec![
                1.0, 2.0, 5.0, 6.0, //
                3.0, 4.0, 7.0, 8.0, //
                -1.0, -2.0, 0.0, 0.5, //
                -3.0, -4.0, 0.25, 0.75,
            ],
            &[1, 1, 4, 4],
        )
        .unwrap();

        let output = pool.forward(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 2, 2]);
        assert_eq!(output.as_slice().unwrap(), &[4.0, 8.0, -1.0, 0.75]);
    }

    #[test]
    fn test_maxpool2d_stem_configuration() {
        // 3x3 kernel, stride 2, padding 1: halves spatial dimensions
        let pool = MaxPool2d::new_square(3, Some(2), 1);
        let input = Tensor::zeros(&[2, 64, 32, 32]);
        let output = pool.forward(&input).unwrap();
        assert_eq!(output.shape(), &[2, 64, 16, 16]);
    }

    #[test]
    fn test_maxpool2d_padding_never_wins() {
        // All-negative input: padded positions must not contribute zeros
        let pool = MaxPool2d::new_square(3, Some(2), 1);
        let input = Tensor::from_vec(vec![-5.0; 16], &[1, 1, 4, 4]).unwrap();
        let output = pool.forward(&input).unwrap();
        for v in output.as_slice().unwrap() {
            assert_eq!(*v, -5.0);
        }
    }

    // ============================================================================
    // BATCH NORMALIZATION TESTS
    // ============================================================================

    #[test]
    fn test_batchnorm_training_normalizes_channels() {
        let bn = BatchNorm2d::new_default(2);

        let input = Tensor::from_vec(
            vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0],
            &[1, 2, 2, 2],
        )
        .unwrap();

        let output = bn.forward(&input).unwrap();
        let result = output.as_slice().unwrap();

        for channel in result.chunks(4) {
            let mean: f32 = channel.iter().sum::<f32>() / 4.0;
            let var: f32 = channel.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
            assert_relative_eq!(var, 1.0, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_batchnorm_updates_running_stats() {
        let bn = BatchNorm2d::new_default(1);
        let input = Tensor::from_vec(vec![2.0, 2.0, 2.0, 2.0], &[1, 1, 2, 2]).unwrap();

        bn.forward(&input).unwrap();

        // running_mean = 0.9 * 0 + 0.1 * 2.0
        let mean = bn.get_running_mean();
        assert_relative_eq!(mean.as_slice().unwrap()[0], 0.2, max_relative = 1e-6);
        assert_eq!(bn.num_batches_tracked(), 1);
    }

    #[test]
    fn test_batchnorm_eval_uses_running_stats() {
        let mut bn = BatchNorm2d::new_default(1);
        bn.eval();

        // Fresh running stats are mean 0, var 1: eval output is x / sqrt(1 + eps)
        let input = Tensor::from_vec(vec![1.0, -2.0, 3.0, -4.0], &[1, 1, 2, 2]).unwrap();
        let output = bn.forward(&input).unwrap();

        let x = input.as_slice().unwrap();
        let y = output.as_slice().unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_relative_eq!(*yi, *xi, max_relative = 1e-4);
        }
        // Running stats stay untouched in eval mode
        assert_eq!(bn.num_batches_tracked(), 0);
    }

    #[test]
    fn test_batchnorm_scale_and_shift() {
        let mut bn = BatchNorm2d::new_default(1);
        bn.eval();
        bn.weight.data = Tensor::from_vec(vec![2.0], &[1]).unwrap();
        bn.bias.data = Tensor::from_vec(vec![1.0], &[1]).unwrap();

        let input = Tensor::from_vec(vec![3.0], &[1, 1, 1, 1]).unwrap();
        let output = bn.forward(&input).unwrap();
        // 3.0 / sqrt(1 + eps) * 2.0 + 1.0
        assert_relative_eq!(output.as_slice().unwrap()[0], 7.0, max_relative = 1e-4);
    }

    #[test]
    fn test_batchnorm_freeze_is_one_way_and_non_trainable() {
        let mut bn = BatchNorm2d::new_default(4);
        assert!(bn.weight.requires_grad);
        assert!(bn.bias.requires_grad);
        assert!(!bn.is_frozen());

        bn.freeze();

        assert!(bn.is_frozen());
        assert!(!bn.weight.requires_grad);
        assert!(!bn.bias.requires_grad);
    }

    #[test]
    fn test_batchnorm_frozen_uses_running_stats_in_training_mode() {
        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]).unwrap();

        let mut frozen = BatchNorm2d::new_default(1);
        frozen.freeze();
        frozen.train();
        let frozen_out = frozen.forward(&input).unwrap();

        let mut eval_bn = BatchNorm2d::new_default(1);
        eval_bn.eval();
        let eval_out = eval_bn.forward(&input).unwrap();

        assert_eq!(frozen_out, eval_out);
        // Frozen statistics never accumulate
        assert_eq!(frozen.num_batches_tracked(), 0);
    }

    #[test]
    fn test_batchnorm_rejects_channel_mismatch() {
        let bn = BatchNorm2d::new_default(8);
        let input = Tensor::zeros(&[1, 4, 2, 2]);
        assert!(bn.forward(&input).is_err());
    }

    // ============================================================================
    // ACTIVATION AND PARAMETER TESTS
    // ============================================================================

    #[test]
    fn test_relu_activation() {
        let relu = ReLU::new();
        let input = Tensor::from_vec(vec![-2.0, -1.0, 0.0, 1.0, 2.0], &[5]).unwrap();
        let output = relu.forward(&input).unwrap();

        assert_eq!(output.shape(), &[5]);
        assert_eq!(output.as_slice().unwrap(), &[0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_parameter_collection() {
        let conv_no_bias = Conv2d::new_square(3, 8, 3, 1, 1, false);
        assert_eq!(conv_no_bias.parameters().len(), 1); // weight only

        let conv_with_bias = Conv2d::new_square(3, 8, 3, 1, 1, true);
        assert_eq!(conv_with_bias.parameters().len(), 2); // weight + bias

        let bn = BatchNorm2d::new_default(8);
        assert_eq!(bn.parameters().len(), 2); // gamma + beta

        let relu = ReLU::new();
        assert_eq!(relu.parameters().len(), 0);

        let pool = MaxPool2d::new_square(2, None, 0);
        assert_eq!(pool.parameters().len(), 0);

        assert_eq!(conv_no_bias.num_parameters(), 8 * 3 * 3 * 3);
    }

    #[test]
    fn test_training_mode() {
        let mut conv = Conv2d::new_square(3, 8, 3, 1, 1, false);
        let mut bn = BatchNorm2d::new_default(8);

        assert!(conv.training());
        assert!(bn.training());

        conv.eval();
        bn.eval();
        assert!(!conv.training());
        assert!(!bn.training());

        conv.train();
        bn.train();
        assert!(conv.training());
        assert!(bn.training());
    }

    #[test]
    fn test_tensor_add_shape_mismatch() {
        let a = Tensor::zeros(&[1, 2, 2, 2]);
        let b = Tensor::zeros(&[1, 3, 2, 2]);
        assert!(a.add(&b).is_err());
    }
}
