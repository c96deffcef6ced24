// src/backbone/mod.rs
// Truncated residual-network backbone: a 7x7 stem followed by up to four
// stages of BasicBlocks. The three-stage variant emits a 256-channel map at
// 1/16 input resolution, the four-stage variant 512 channels at 1/32.

use crate::checkpoint::{CheckpointError, StateDict, Stateful, join};
use crate::nn::parameter::Parameter;
use crate::nn::{BatchNorm2d, Conv2d, MaxPool2d, Module, ReLU};
use crate::tensor::Tensor;
use std::collections::HashSet;
use std::path::Path;

/// Channel widths of the four stages.
const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];
/// Spatial stride applied by the first block of each stage.
const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];
/// Stem output channels.
const STEM_PLANES: usize = 64;

/// 3x3 convolution with padding
fn conv3x3(in_planes: usize, out_planes: usize, stride: usize) -> Conv2d {
    Conv2d::new_square(in_planes, out_planes, 3, stride, 1, false)
}

/// 1x1 projection convolution
fn conv1x1(in_planes: usize, out_planes: usize, stride: usize) -> Conv2d {
    Conv2d::new_square(in_planes, out_planes, 1, stride, 0, false)
}

/// Projection shortcut: a stride-matched 1x1 convolution plus normalization,
/// used when a stage changes channel width or spatial stride.
///
/// State keys use the positional convention "downsample.0" (conv) and
/// "downsample.1" (norm).
#[derive(Debug)]
pub struct Downsample {
    conv: Conv2d,
    bn: BatchNorm2d,
}

impl Downsample {
    pub fn new(in_planes: usize, out_planes: usize, stride: usize) -> Self {
        Self {
            conv: conv1x1(in_planes, out_planes, stride),
            bn: BatchNorm2d::new_default(out_planes),
        }
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let out = self.conv.forward(input)?;
        self.bn.forward(&out)
    }
}

impl Stateful for Downsample {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict) {
        self.conv.collect_state(&join(prefix, "0"), dict);
        self.bn.collect_state(&join(prefix, "1"), dict);
    }

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError> {
        self.conv.apply_state(&join(prefix, "0"), dict)?;
        self.bn.apply_state(&join(prefix, "1"), dict)
    }
}

/// Residual block with two 3x3 convolution+normalization steps and a skip
/// connection. The shortcut is the identity unless the block changes stride
/// or channel width, in which case a [`Downsample`] projection is required.
#[derive(Debug)]
pub struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    downsample: Option<Downsample>,
    relu: ReLU,
    training: bool,
}

impl BasicBlock {
    /// Creates a block mapping `inplanes` input channels to `planes` output
    /// channels at the given stride.
    ///
    /// # Panics
    ///
    /// Panics if the shortcut cannot match the main path: a stride other
    /// than 1 or a channel-width change requires a projection shortcut.
    pub fn new(
        inplanes: usize,
        planes: usize,
        stride: usize,
        downsample: Option<Downsample>,
    ) -> Self {
        assert!(
            downsample.is_some() || (stride == 1 && inplanes == planes),
            "BasicBlock shortcut cannot match main path: {}ch stride {} -> {}ch requires a projection",
            inplanes,
            stride,
            planes
        );

        Self {
            conv1: conv3x3(inplanes, planes, stride),
            bn1: BatchNorm2d::new_default(planes),
            conv2: conv3x3(planes, planes, 1),
            bn2: BatchNorm2d::new_default(planes),
            downsample,
            relu: ReLU::new(),
            training: true,
        }
    }

    /// Whether this block uses a projection shortcut.
    pub fn has_projection(&self) -> bool {
        self.downsample.is_some()
    }

    fn freeze_norm(&mut self) {
        self.bn1.freeze();
        self.bn2.freeze();
        if let Some(ref mut ds) = self.downsample {
            ds.bn.freeze();
        }
    }
}

impl Module for BasicBlock {
    /// conv -> norm -> relu -> conv -> norm, add the shortcut, final relu.
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let mut out = self.conv1.forward(input)?;
        out = self.bn1.forward(&out)?;
        out = self.relu.forward(&out)?;
        out = self.conv2.forward(&out)?;
        out = self.bn2.forward(&out)?;

        let residual = match self.downsample {
            Some(ref ds) => ds.forward(input)?,
            None => input.clone(),
        };

        let sum = out.add(&residual)?;
        self.relu.forward(&sum)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.conv1.parameters();
        params.extend(self.bn1.parameters());
        params.extend(self.conv2.parameters());
        params.extend(self.bn2.parameters());
        if let Some(ref ds) = self.downsample {
            params.extend(ds.conv.parameters());
            params.extend(ds.bn.parameters());
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.conv1.parameters_mut();
        params.extend(self.bn1.parameters_mut());
        params.extend(self.conv2.parameters_mut());
        params.extend(self.bn2.parameters_mut());
        if let Some(ref mut ds) = self.downsample {
            params.extend(ds.conv.parameters_mut());
            params.extend(ds.bn.parameters_mut());
        }
        params
    }

    fn training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.conv1.set_training(training);
        self.bn1.set_training(training);
        self.conv2.set_training(training);
        self.bn2.set_training(training);
        if let Some(ref mut ds) = self.downsample {
            ds.conv.set_training(training);
            ds.bn.set_training(training);
        }
    }
}

impl Stateful for BasicBlock {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict) {
        self.conv1.collect_state(&join(prefix, "conv1"), dict);
        self.bn1.collect_state(&join(prefix, "bn1"), dict);
        self.conv2.collect_state(&join(prefix, "conv2"), dict);
        self.bn2.collect_state(&join(prefix, "bn2"), dict);
        if let Some(ref ds) = self.downsample {
            ds.collect_state(&join(prefix, "downsample"), dict);
        }
    }

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError> {
        self.conv1.apply_state(&join(prefix, "conv1"), dict)?;
        self.bn1.apply_state(&join(prefix, "bn1"), dict)?;
        self.conv2.apply_state(&join(prefix, "conv2"), dict)?;
        self.bn2.apply_state(&join(prefix, "bn2"), dict)?;
        if let Some(ref mut ds) = self.downsample {
            ds.apply_state(&join(prefix, "downsample"), dict)?;
        }
        Ok(())
    }
}

/// A stage: a sequential group of residual blocks at one channel width.
/// The first block carries the stage stride and the projection shortcut when
/// width or stride changes; the remaining blocks are stride-1 identity.
#[derive(Debug)]
pub struct Stage {
    blocks: Vec<BasicBlock>,
}

impl Stage {
    /// Builds `blocks` BasicBlocks, updating `inplanes` to the stage width.
    fn new(inplanes: &mut usize, planes: usize, blocks: usize, stride: usize) -> Self {
        let downsample = if stride != 1 || *inplanes != planes {
            Some(Downsample::new(*inplanes, planes, stride))
        } else {
            None
        };

        let mut block_list = Vec::with_capacity(blocks);
        block_list.push(BasicBlock::new(*inplanes, planes, stride, downsample));
        *inplanes = planes;
        for _ in 1..blocks {
            block_list.push(BasicBlock::new(planes, planes, 1, None));
        }

        Self { blocks: block_list }
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    fn freeze_norm(&mut self) {
        for block in &mut self.blocks {
            block.freeze_norm();
        }
    }
}

impl Module for Stage {
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let mut current = input.clone();
        for block in &self.blocks {
            current = block.forward(&current)?;
        }
        Ok(current)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.blocks.iter().flat_map(|b| b.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.blocks
            .iter_mut()
            .flat_map(|b| b.parameters_mut())
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        for block in &mut self.blocks {
            block.set_training(training);
        }
    }
}

impl Stateful for Stage {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict) {
        for (i, block) in self.blocks.iter().enumerate() {
            block.collect_state(&join(prefix, &i.to_string()), dict);
        }
    }

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError> {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.apply_state(&join(prefix, &i.to_string()), dict)?;
        }
        Ok(())
    }
}

/// Backbone configuration: stage count and blocks per stage.
///
/// Stage widths and strides are fixed (64/128/256/512, strides 1/2/2/2);
/// the shallow and deep variants differ only in how many stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackboneConfig {
    /// Number of stages to build (1 to 4)
    pub stages: usize,
    /// Residual blocks per stage
    pub blocks: [usize; 4],
}

impl BackboneConfig {
    /// Three stages: 256-channel output at 1/16 input resolution.
    pub fn shallow() -> Self {
        Self {
            stages: 3,
            blocks: [2, 2, 2, 2],
        }
    }

    /// Four stages: 512-channel output at 1/32 input resolution.
    pub fn deep() -> Self {
        Self {
            stages: 4,
            blocks: [2, 2, 2, 2],
        }
    }
}

/// Convolutional feature-extraction backbone.
///
/// Stem (7x7 conv, norm, relu, 3x3 max-pool) followed by a fixed sequence of
/// residual stages. Forward maps (B, 3, H, W) to (B, out_channels, H/r, W/r)
/// where `r` is [`Backbone::reduction`].
///
/// # Examples
///
/// ```rust
/// use convfeat::{Backbone, Module, Tensor};
///
/// let backbone = Backbone::shallow(None).unwrap();
/// let image = Tensor::zeros(&[1, 3, 64, 64]);
/// let features = backbone.forward(&image).unwrap();
/// assert_eq!(features.shape(), &[1, 256, 4, 4]);
/// ```
#[derive(Debug)]
pub struct Backbone {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    relu: ReLU,
    maxpool: MaxPool2d,
    stages: Vec<Stage>,
    config: BackboneConfig,
    training: bool,
}

impl Backbone {
    /// Builds the backbone with randomly initialized weights.
    ///
    /// # Panics
    ///
    /// Panics if the configured stage count is outside 1..=4.
    pub fn new(config: BackboneConfig) -> Self {
        assert!(
            (1..=4).contains(&config.stages),
            "Backbone supports 1 to 4 stages, got {}",
            config.stages
        );

        let mut inplanes = STEM_PLANES;
        let mut stages = Vec::with_capacity(config.stages);
        for idx in 0..config.stages {
            stages.push(Stage::new(
                &mut inplanes,
                STAGE_PLANES[idx],
                config.blocks[idx],
                STAGE_STRIDES[idx],
            ));
        }

        Self {
            conv1: Conv2d::new_square(3, STEM_PLANES, 7, 2, 3, false),
            bn1: BatchNorm2d::new_default(STEM_PLANES),
            relu: ReLU::new(),
            maxpool: MaxPool2d::new_square(3, Some(2), 1),
            stages,
            config,
            training: true,
        }
    }

    /// Builds the backbone, optionally loading pretrained weights.
    pub fn with_config(
        config: BackboneConfig,
        weights: Option<&Path>,
    ) -> Result<Self, CheckpointError> {
        let mut backbone = Self::new(config);
        if let Some(path) = weights {
            backbone.load_pretrained(path)?;
        }
        Ok(backbone)
    }

    /// Three-stage variant, optionally initialized from a pretrained set.
    pub fn shallow(weights: Option<&Path>) -> Result<Self, CheckpointError> {
        Self::with_config(BackboneConfig::shallow(), weights)
    }

    /// Four-stage variant, optionally initialized from a pretrained set.
    pub fn deep(weights: Option<&Path>) -> Result<Self, CheckpointError> {
        Self::with_config(BackboneConfig::deep(), weights)
    }

    /// The configuration this backbone was built with.
    pub fn config(&self) -> &BackboneConfig {
        &self.config
    }

    /// Number of stages.
    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Channel count of the output feature map.
    pub fn out_channels(&self) -> usize {
        STAGE_PLANES[self.config.stages - 1]
    }

    /// Factor by which the spatial resolution is reduced end to end.
    /// The stem contributes 4, each stage after the first contributes 2.
    pub fn reduction(&self) -> usize {
        4 << (self.config.stages - 1)
    }

    /// Runs the stem and the first `stages` stages.
    ///
    /// The stage prefix shared by the shallow and deep variants can be
    /// compared this way. Fails if `stages` exceeds the configured count.
    pub fn forward_stages(&self, input: &Tensor, stages: usize) -> Result<Tensor, String> {
        if stages > self.stages.len() {
            return Err(format!(
                "Requested {} stages but backbone has {}",
                stages,
                self.stages.len()
            ));
        }

        let mut out = self.conv1.forward(input)?;
        out = self.bn1.forward(&out)?;
        out = self.relu.forward(&out)?;
        out = self.maxpool.forward(&out)?;

        for stage in &self.stages[..stages] {
            out = stage.forward(&out)?;
        }
        Ok(out)
    }

    /// Collects the full parameter set of this backbone.
    pub fn state_dict(&self) -> StateDict {
        let mut dict = StateDict::new();
        self.collect_state("", &mut dict);
        dict
    }

    /// The parameter names this backbone declares.
    fn declared_keys(&self) -> HashSet<String> {
        self.state_dict().tensors.into_keys().collect()
    }

    /// Loads a pretrained parameter set from `path`.
    ///
    /// The set is filtered to an allow list computed from this module's own
    /// declared parameter names: entries this backbone does not declare
    /// (deeper stages, classifier heads, foreign buffers) are silently
    /// dropped. Every declared parameter must be present with a matching
    /// shape or loading fails.
    pub fn load_pretrained(&mut self, path: &Path) -> Result<(), CheckpointError> {
        let loaded = StateDict::load(path)?;
        let declared = self.declared_keys();
        let filtered = loaded.filtered(|key| declared.contains(key));
        self.apply_state("", &filtered)
    }

    /// Restores a checkpoint saved from this exact architecture.
    ///
    /// No filtering is applied: the loaded key set must equal the declared
    /// key set, and every shape must match.
    pub fn resume(&mut self, path: &Path) -> Result<(), CheckpointError> {
        let loaded = StateDict::load(path)?;
        let declared = self.declared_keys();
        for key in loaded.keys() {
            if !declared.contains(key) {
                return Err(CheckpointError::UnexpectedKey(key.clone()));
            }
        }
        self.apply_state("", &loaded)
    }

    /// Saves the full parameter set to `path`.
    pub fn save_checkpoint(&self, path: &Path) -> Result<(), CheckpointError> {
        self.state_dict().save(path)
    }

    /// Switches every normalization layer into frozen mode: running
    /// statistics are used in every mode and scale/shift parameters stop
    /// taking gradient updates. One-way toggle.
    pub fn freeze_norm(&mut self) {
        self.bn1.freeze();
        for stage in &mut self.stages {
            stage.freeze_norm();
        }
    }
}

impl Module for Backbone {
    /// Stem followed by all configured stages.
    /// Input shape: [batch, 3, height, width]
    fn forward(&self, input: &Tensor) -> Result<Tensor, String> {
        let input_shape = input.shape();
        if input_shape.len() != 4 {
            return Err(format!(
                "Backbone requires 4D input [batch, channels, height, width], got shape {:?}",
                input_shape
            ));
        }
        self.forward_stages(input, self.stages.len())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.conv1.parameters();
        params.extend(self.bn1.parameters());
        for stage in &self.stages {
            params.extend(stage.parameters());
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.conv1.parameters_mut();
        params.extend(self.bn1.parameters_mut());
        for stage in &mut self.stages {
            params.extend(stage.parameters_mut());
        }
        params
    }

    fn training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.conv1.set_training(training);
        self.bn1.set_training(training);
        self.relu.set_training(training);
        self.maxpool.set_training(training);
        for stage in &mut self.stages {
            stage.set_training(training);
        }
    }
}

impl Stateful for Backbone {
    fn collect_state(&self, prefix: &str, dict: &mut StateDict) {
        self.conv1.collect_state(&join(prefix, "conv1"), dict);
        self.bn1.collect_state(&join(prefix, "bn1"), dict);
        for (i, stage) in self.stages.iter().enumerate() {
            stage.collect_state(&join(prefix, &format!("layer{}", i + 1)), dict);
        }
    }

    fn apply_state(&mut self, prefix: &str, dict: &StateDict) -> Result<(), CheckpointError> {
        self.conv1.apply_state(&join(prefix, "conv1"), dict)?;
        self.bn1.apply_state(&join(prefix, "bn1"), dict)?;
        for (i, stage) in self.stages.iter_mut().enumerate() {
            stage.apply_state(&join(prefix, &format!("layer{}", i + 1)), dict)?;
        }
        Ok(())
    }
}
