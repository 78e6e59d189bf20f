use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Relu,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
    tensor::module::max_pool2d_with_indices,
};
use nn::PaddingConfig2d;

/// Basic SegNet unit: BatchNorm over the incoming channels, a same-padding
/// 3x3 convolution, then ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    norm: BatchNorm<B, 2>,
    conv: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(x);
        let x = self.conv.forward(x);

        self.activation.forward(x)
    }

    /// Replace this block's convolution filters with the ones of `source`,
    /// keeping our parameter ids. Shapes must already have been checked.
    pub(crate) fn adopt_filters(&mut self, source: &Conv2d<B>) {
        self.conv.weight = self.conv.weight.clone().map(|_| source.weight.val());

        if let (Some(bias), Some(source_bias)) = (self.conv.bias.clone(), source.bias.as_ref()) {
            self.conv.bias = Some(bias.map(|_| source_bias.val()));
        }
    }

    pub(crate) fn filter_shape(&self) -> [usize; 4] {
        self.conv.weight.dims()
    }
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    input_channels: usize,
    output_channels: usize,
    #[config(default = "[3, 3]")]
    kernel_size: [usize; 2],
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            norm: BatchNormConfig::new(self.input_channels).init(device),
            conv: Conv2dConfig::new([self.input_channels, self.output_channels], self.kernel_size)
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            activation: Relu::new(),
        }
    }
}

/// Argmax locations and pre-pool spatial size recorded by one pooling stage.
///
/// Each value is produced by exactly one encoder stage and consumed by the
/// mirrored decoder stage; nothing is kept across forward passes.
#[derive(Debug, Clone)]
pub struct PoolIndices<B: Backend> {
    pub indices: Tensor<B, 4, Int>,
    pub size: [usize; 2],
}

/// Exact unpooling: places `x` back at the recorded argmax positions of a
/// zero canvas of the recorded pre-pool size.
///
/// The 2x2 stride-2 windows never overlap, so the scatter-add amounts to
/// plain assignment. Shapes inconsistent with exact halving are a caller
/// error; no inference or padding is attempted.
pub fn max_unpool2d<B: Backend>(x: Tensor<B, 4>, pool: PoolIndices<B>) -> Tensor<B, 4> {
    let [batch_size, channels, height, width] = x.dims();
    let [out_height, out_width] = pool.size;

    assert!(
        out_height == height * 2 && out_width == width * 2,
        "Recorded pre-pool size ({},{}) is not double the pooled size ({},{})",
        out_height,
        out_width,
        height,
        width
    );
    assert!(
        pool.indices.dims() == x.dims(),
        "Pooling indices shape {:?} does not match input shape {:?}",
        pool.indices.dims(),
        x.dims()
    );

    let device = x.device();
    let values = x.reshape([batch_size, channels, height * width]);
    let indices = pool.indices.reshape([batch_size, channels, height * width]);

    let canvas = Tensor::zeros([batch_size, channels, out_height * out_width], &device);

    canvas
        .scatter(2, indices, values)
        .reshape([batch_size, channels, out_height, out_width])
}

/// One encoder stage: a run of conv blocks followed by 2x2 stride-2 max
/// pooling that records its argmax indices and pre-pool size.
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    conv_blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> EncoderStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, PoolIndices<B>) {
        let mut x = x;
        for block in &self.conv_blocks {
            x = block.forward(x);
        }

        let [_, _, height, width] = x.dims();
        let (pooled, indices) = max_pool2d_with_indices(x, [2, 2], [2, 2], [0, 0], [1, 1]);

        (
            pooled,
            PoolIndices {
                indices,
                size: [height, width],
            },
        )
    }

    pub(crate) fn conv_blocks_mut(&mut self) -> &mut [ConvBlock<B>] {
        &mut self.conv_blocks
    }

    pub(crate) fn conv_count(&self) -> usize {
        self.conv_blocks.len()
    }
}

#[derive(Config, Debug)]
pub struct EncoderStageConfig {
    /// Channel counts through the stage, e.g. [3, 64, 64] for two blocks.
    channels: Vec<usize>,
}

impl EncoderStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderStage<B> {
        EncoderStage {
            conv_blocks: conv_chain(&self.channels, device),
        }
    }
}

/// One decoder stage: exact unpooling from the matching encoder stage's
/// record, then a run of conv blocks mirroring the encoder widths.
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    conv_blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> DecoderStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>, pool: PoolIndices<B>) -> Tensor<B, 4> {
        let mut x = max_unpool2d(x, pool);
        for block in &self.conv_blocks {
            x = block.forward(x);
        }

        x
    }
}

#[derive(Config, Debug)]
pub struct DecoderStageConfig {
    channels: Vec<usize>,
}

impl DecoderStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecoderStage<B> {
        DecoderStage {
            conv_blocks: conv_chain(&self.channels, device),
        }
    }
}

fn conv_chain<B: Backend>(channels: &[usize], device: &B::Device) -> Vec<ConvBlock<B>> {
    assert!(
        channels.len() >= 2,
        "A stage needs at least one convolution. Got channel list {:?}",
        channels
    );

    channels
        .windows(2)
        .map(|pair| ConvBlockConfig::new(pair[0], pair[1]).init(device))
        .collect()
}
