//! # Convfeat
//!
//! Convfeat is a CPU-based convolutional feature-extraction backbone: a
//! truncated residual network that turns an image batch into a spatial
//! feature map for a downstream perception pipeline.
//!
//! ## Features
//!
//! - Forward-only Conv2d, BatchNorm2d, MaxPool2d and ReLU primitives over `ndarray`
//! - Residual BasicBlocks with identity or projection shortcuts
//! - A configurable stage count: three stages (256 channels at 1/16
//!   resolution) or four (512 channels at 1/32)
//! - Pretrained-weight loading with allow-list filtering of foreign keys
//! - Strict checkpoint save/resume through a bincode state dict
//! - Freezable batch-normalization statistics for fine-tuning
//! - Written 100% in safe Rust
//!
pub mod backbone;
pub mod checkpoint;
pub mod initializers;
pub mod nn;
pub mod tensor;

// Re-export commonly used types for convenience
pub use backbone::{Backbone, BackboneConfig, BasicBlock, Downsample, Stage};
pub use checkpoint::{CheckpointError, StateDict, Stateful, TensorBuffer};
pub use nn::{Module, Parameter};
pub use tensor::Tensor;
