use crate::tensor::Tensor;
use rand::rng;
use rand_distr::{Distribution, Uniform};

/// Kaiming/He uniform initialization
/// Samples from a uniform distribution U(-bound, bound) where bound = sqrt(6 / fan_in)
/// Specifically designed for ReLU activations
pub fn kaiming_uniform(fan_in: usize) -> impl Fn() -> f32 {
    let bound = (6.0 / fan_in as f32).sqrt();
    let uniform = Uniform::new(-bound, bound).unwrap();

    move || {
        let mut rng = rng();
        uniform.sample(&mut rng)
    }
}

/// Initializes a complete weight tensor with Kaiming-uniform values.
///
/// Fan-in follows the convolution/linear weight convention: the product of
/// every dimension except the leading (output-channel) one. For a conv
/// weight [out_c, in_c, kh, kw] that is `in_c * kh * kw`.
pub fn init_tensor_kaiming_uniform(shape: &[usize]) -> Tensor {
    let fan_in = if shape.len() >= 2 {
        shape[1..].iter().product::<usize>().max(1)
    } else {
        1
    };
    let total_size: usize = shape.iter().product();

    let initializer = kaiming_uniform(fan_in);
    let data = (0..total_size).map(|_| initializer()).collect();
    if let Ok(tensor) = Tensor::from_vec(data, shape) {
        tensor
    } else {
        panic!("Failed to create tensor with shape {:?}", shape);
    }
}
