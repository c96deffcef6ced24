// Neural network building blocks for the feature-extraction backbone:
// forward-only layer primitives, the Module trait, and Parameter storage.

pub mod layers;
pub mod module;
pub mod parameter;
mod tests;

// Re-export the main types and traits for convenience
pub use layers::{BatchNorm2d, Conv2d, MaxPool2d, ReLU};
pub use module::Module;
pub use parameter::Parameter;

/// Weight initialization utilities
pub mod init {
    pub use crate::initializers::*;
}
