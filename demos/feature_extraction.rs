// demos/feature_extraction.rs
// Builds the two backbone variants, runs an image batch through them, and
// round-trips a checkpoint from disk.

use convfeat::{Backbone, Module, Tensor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A dummy image batch: 2 RGB images at 224x224
    let pixels: Vec<f32> = (0..2 * 3 * 224 * 224)
        .map(|i| ((i % 255) as f32) / 255.0)
        .collect();
    let images = Tensor::from_vec(pixels, &[2, 3, 224, 224])?;

    let mut shallow = Backbone::shallow(None)?;
    shallow.eval();
    let features = shallow.forward(&images)?;
    println!(
        "Shallow backbone: {:?} -> {:?} ({} channels, 1/{} resolution)",
        images.shape(),
        features.shape(),
        shallow.out_channels(),
        shallow.reduction()
    );

    let mut deep = Backbone::deep(None)?;
    deep.eval();
    let features = deep.forward(&images)?;
    println!(
        "Deep backbone:    {:?} -> {:?} ({} channels, 1/{} resolution)",
        images.shape(),
        features.shape(),
        deep.out_channels(),
        deep.reduction()
    );

    // Save the shallow weights and restore them into a fresh instance
    let checkpoint = std::env::temp_dir().join("convfeat_demo_checkpoint.bin");
    shallow.save_checkpoint(&checkpoint)?;

    let mut restored = Backbone::shallow(None)?;
    restored.resume(&checkpoint)?;
    restored.freeze_norm();
    restored.eval();
    let restored_features = restored.forward(&images)?;
    println!(
        "Restored backbone reproduces features: {}",
        restored_features == shallow.forward(&images)?
    );

    std::fs::remove_file(&checkpoint).ok();
    Ok(())
}
