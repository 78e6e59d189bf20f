use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Relu,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
};
use nn::Sigmoid;

use super::blocks::{ConvBlock, ConvBlockConfig};

/// Gates an externally supplied shared feature map through a learned
/// per-pixel attention mask, then refines the result with one 3x3 conv block.
///
/// The mask path is two 1x1 convolutions (in -> inter -> mask channels) with
/// BatchNorm+ReLU between them and a final sigmoid squashing to [0, 1]. The
/// mask channel count must match the shared feature map's channels.
#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    squeeze: Conv2d<B>,
    squeeze_norm: BatchNorm<B, 2>,
    excite: Conv2d<B>,
    excite_norm: BatchNorm<B, 2>,
    activation: Relu,
    gate: Sigmoid,
    refine: ConvBlock<B>,
}

impl<B: Backend> AttentionBlock<B> {
    /// Compute the attention mask from `x` and apply it to `shared_features`.
    pub fn forward(&self, x: Tensor<B, 4>, shared_features: Tensor<B, 4>) -> Tensor<B, 4> {
        let mask = self.attention_mask(x);
        let gated = shared_features * mask;

        self.refine.forward(gated)
    }

    /// The per-pixel mask alone, in [0, 1].
    pub fn attention_mask(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.squeeze.forward(x);
        let x = self.squeeze_norm.forward(x);
        let x = self.activation.forward(x);
        let x = self.excite.forward(x);
        let x = self.excite_norm.forward(x);

        self.gate.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct AttentionBlockConfig {
    input_channels: usize,
    inter_channels: usize,
    /// Channels of the mask; must equal the shared feature map's channels.
    mask_channels: usize,
    /// Output channels of the refining convolution.
    output_channels: usize,
}

impl AttentionBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionBlock<B> {
        AttentionBlock {
            squeeze: Conv2dConfig::new([self.input_channels, self.inter_channels], [1, 1])
                .init(device),
            squeeze_norm: BatchNormConfig::new(self.inter_channels).init(device),
            excite: Conv2dConfig::new([self.inter_channels, self.mask_channels], [1, 1])
                .init(device),
            excite_norm: BatchNormConfig::new(self.mask_channels).init(device),
            activation: Relu::new(),
            gate: Sigmoid::new(),
            refine: ConvBlockConfig::new(self.mask_channels, self.output_channels).init(device),
        }
    }
}
