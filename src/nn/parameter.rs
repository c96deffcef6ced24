use crate::initializers::init_tensor_kaiming_uniform;
use crate::tensor::Tensor;

/// A Parameter is a tensor that represents a learnable quantity of a layer.
///
/// Parameters are collected when traversing a module hierarchy and carry a
/// `requires_grad` flag so an external training loop can tell which tensors
/// take gradient updates. Freezing a normalization layer clears the flag on
/// its scale and shift parameters.
///
/// # Examples
///
/// ```rust
/// use convfeat::Tensor;
/// use convfeat::nn::Parameter;
///
/// let weight = Parameter::new(Tensor::zeros(&[64, 3, 7, 7]));
/// assert!(weight.requires_grad);
/// assert_eq!(weight.shape(), &[64, 3, 7, 7]);
/// ```
#[derive(Debug, Clone)]
pub struct Parameter {
    /// The actual tensor data
    pub data: Tensor,
    /// Whether this parameter takes gradient updates during training
    pub requires_grad: bool,
    /// Optional name for debugging
    pub name: Option<String>,
}

impl Parameter {
    /// Creates a new parameter from tensor data.
    pub fn new(data: Tensor) -> Self {
        Self {
            data,
            requires_grad: true,
            name: None,
        }
    }

    /// Creates a parameter initialized with Kaiming-uniform values.
    pub fn kaiming_uniform(shape: &[usize]) -> Self {
        Self::new(init_tensor_kaiming_uniform(shape))
    }

    /// Creates a zero-initialized parameter.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(Tensor::zeros(shape))
    }

    /// Creates a one-initialized parameter.
    pub fn ones(shape: &[usize]) -> Self {
        Self::new(Tensor::ones(shape))
    }

    /// Returns the shape of the parameter.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns the number of elements in the parameter.
    pub fn size(&self) -> usize {
        self.data.size()
    }

    /// Gets the parameter name if available.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sets the parameter name.
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }
}

impl From<Tensor> for Parameter {
    fn from(tensor: Tensor) -> Self {
        Self::new(tensor)
    }
}
