// src/nn/layers/mod.rs
// Layer primitives used by the backbone.

pub mod activation;
pub mod conv2d;
pub mod norm;
pub mod pooling;

// Re-export commonly used layers for convenience
pub use activation::ReLU;
pub use conv2d::Conv2d;
pub use norm::BatchNorm2d;
pub use pooling::MaxPool2d;
