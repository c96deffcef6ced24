// src/tensor.rs
// Owned f32 tensor used throughout the backbone.
// Thin wrapper over ndarray's dynamic-dimensional array with the NCHW
// convention for image batches.

use ndarray::{ArrayD, IxDyn};

/// An owned, CPU-resident f32 tensor.
///
/// All layer inputs and outputs in this crate are `Tensor`s. Image batches
/// follow the [batch, channels, height, width] layout.
///
/// # Examples
///
/// ```rust
/// use convfeat::Tensor;
///
/// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
/// assert_eq!(t.shape(), &[2, 2]);
/// assert_eq!(t.size(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// Wraps an existing ndarray array.
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Creates a tensor from a flat vector and a shape.
    ///
    /// Fails if the vector length does not match the product of the shape.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self, String> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(Self::new)
            .map_err(|e| format!("Failed to create tensor with shape {:?}: {}", shape, e))
    }

    /// Creates a zero-filled tensor.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    /// Creates a one-filled tensor.
    pub fn ones(shape: &[usize]) -> Self {
        Self::new(ArrayD::ones(IxDyn(shape)))
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Returns the total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the underlying data as a contiguous slice.
    ///
    /// Tensors built through this crate are always contiguous in standard
    /// layout; views or transposed arrays wrapped via [`Tensor::new`] may
    /// not be.
    pub fn as_slice(&self) -> Result<&[f32], String> {
        self.data
            .as_slice()
            .ok_or_else(|| "Tensor data is not contiguous".to_string())
    }

    /// Copies the elements into a flat vector in logical order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Borrows the underlying ndarray array.
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Mutably borrows the underlying ndarray array.
    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    /// Consumes the tensor and returns the underlying array.
    pub fn into_data(self) -> ArrayD<f32> {
        self.data
    }

    /// Element-wise addition. Both tensors must have identical shapes;
    /// no broadcasting is performed here.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, String> {
        if self.shape() != other.shape() {
            return Err(format!(
                "Shape mismatch in tensor addition: {:?} vs {:?}",
                self.shape(),
                other.shape()
            ));
        }
        Ok(Self::new(&self.data + &other.data))
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self::new(data)
    }
}
