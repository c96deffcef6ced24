use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;

/// The base trait for all neural network modules.
///
/// It provides methods for parameter collection, training/evaluation mode
/// switching, and the forward pass computation. Composite modules (residual
/// blocks, stages, the backbone itself) recursively delegate to their
/// children.
///
/// # Examples
///
/// ```rust
/// use convfeat::Tensor;
/// use convfeat::nn::{Module, Parameter};
///
/// struct Scale {
///     factor: Parameter,
///     training: bool,
/// }
///
/// impl Module for Scale {
///     fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
///         let k = self.factor.data.as_slice()?[0];
///         Ok(Tensor::new(input.data() * k))
///     }
///
///     fn parameters(&self) -> Vec<&Parameter> {
///         vec![&self.factor]
///     }
///
///     fn training(&self) -> bool {
///         self.training
///     }
///
///     fn set_training(&mut self, training: bool) {
///         self.training = training;
///     }
/// }
/// ```
pub trait Module {
    /// Performs the forward pass of the module.
    fn forward(&self, input: &Tensor) -> Result<Tensor, String>;

    /// Returns all parameters of this module.
    ///
    /// This method should recursively collect parameters from all
    /// submodules. The default implementation returns an empty vector;
    /// parameterized modules override it.
    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    /// Returns mutable references to all parameters of this module.
    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    /// Returns whether the module is in training mode.
    ///
    /// Training mode affects batch normalization statistics.
    fn training(&self) -> bool {
        true
    }

    /// Sets the training mode for this module and all submodules.
    fn set_training(&mut self, training: bool);

    /// Sets the module to evaluation mode.
    fn eval(&mut self) {
        self.set_training(false);
    }

    /// Sets the module to training mode.
    fn train(&mut self) {
        self.set_training(true);
    }

    /// Returns the number of scalar parameters in this module, submodules
    /// included.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.size()).sum()
    }
}
