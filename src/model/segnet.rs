use burn::{
    nn::{
        Linear, LinearConfig,
        conv::Conv2d,
    },
    prelude::*,
    tensor::{activation::relu, backend::AutodiffBackend},
};
use thiserror::Error;

#[cfg(feature = "training")]
use crate::{
    dataset::MultiTaskBatch,
    training::{MultiTaskOutput, loss::MultiTaskLossConfig},
};
#[cfg(feature = "training")]
use burn::train::{TrainOutput, TrainStep, ValidStep};

use super::blocks::{
    ConvBlock, ConvBlockConfig, DecoderStage, DecoderStageConfig, EncoderStage, EncoderStageConfig,
    max_unpool2d,
};

/// Number of convolutions across the five encoder stages (VGG16 layout).
const ENCODER_CONVS: usize = 13;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("pretrained source has {found} convolution layers, the encoder expects {expected}")]
    PretrainedLayerCount { expected: usize, found: usize },

    #[error(
        "pretrained filter {index} has shape {found:?}, the encoder convolution expects {expected:?}"
    )]
    PretrainedFilterShape {
        index: usize,
        expected: [usize; 4],
        found: [usize; 4],
    },
}

/// Multi-task SegNet: a VGG16-shaped encoder with index-recording pooling,
/// dense classification and bounding-box heads off the flattened bottleneck,
/// a mirrored decoder with exact unpooling, and an auxiliary edge head off
/// the last unpooled feature map.
#[derive(Module, Debug)]
pub struct SegNet<B: Backend> {
    encoder_stage_1: EncoderStage<B>,
    encoder_stage_2: EncoderStage<B>,
    encoder_stage_3: EncoderStage<B>,
    encoder_stage_4: EncoderStage<B>,
    encoder_stage_5: EncoderStage<B>,

    class_fc_0: Linear<B>,
    class_fc_1: Linear<B>,
    bbox_fc_0: Linear<B>,
    bbox_fc_1: Linear<B>,

    decoder_stage_5: DecoderStage<B>,
    decoder_stage_4: DecoderStage<B>,
    decoder_stage_3: DecoderStage<B>,
    decoder_stage_2: DecoderStage<B>,

    seg_block_1: ConvBlock<B>,
    seg_block_2: ConvBlock<B>,
    edge_block_1: ConvBlock<B>,
    edge_block_2: ConvBlock<B>,
}

/// The four task outputs of one forward pass.
#[derive(Clone, Debug)]
pub struct SegNetPrediction<B: Backend> {
    /// Classification logits, `[batch, num_classes]`.
    pub class_logits: Tensor<B, 2>,
    /// Bounding box per sample, `[batch, 4]` as `[x0, y0, x1, y1]` pixels.
    pub boxes: Tensor<B, 2>,
    /// Per-pixel class scores, `[batch, seg_classes, height, width]`.
    pub segmentation: Tensor<B, 4>,
    /// Auxiliary edge map, `[batch, 1, height, width]`.
    pub edges: Tensor<B, 4>,
}

#[derive(Config, Debug)]
pub struct SegNetConfig {
    /// Input spatial size; both dimensions must be divisible by 32 so the
    /// five pooling stages halve exactly.
    input_size: [usize; 2],
    #[config(default = "2")]
    num_classes: usize,
    #[config(default = "2")]
    seg_classes: usize,
}

impl SegNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegNet<B> {
        self.assertions();

        let [height, width] = self.input_size;
        let embedding_size = 512 * (height / 32) * (width / 32);

        SegNet {
            encoder_stage_1: EncoderStageConfig::new(vec![3, 64, 64]).init(device),
            encoder_stage_2: EncoderStageConfig::new(vec![64, 128, 128]).init(device),
            encoder_stage_3: EncoderStageConfig::new(vec![128, 256, 256, 256]).init(device),
            encoder_stage_4: EncoderStageConfig::new(vec![256, 512, 512, 512]).init(device),
            encoder_stage_5: EncoderStageConfig::new(vec![512, 512, 512, 512]).init(device),

            class_fc_0: LinearConfig::new(embedding_size, 128).init(device),
            class_fc_1: LinearConfig::new(128, self.num_classes).init(device),
            bbox_fc_0: LinearConfig::new(embedding_size, 64).init(device),
            bbox_fc_1: LinearConfig::new(64, 4).init(device),

            decoder_stage_5: DecoderStageConfig::new(vec![512, 512, 512, 512]).init(device),
            decoder_stage_4: DecoderStageConfig::new(vec![512, 512, 512, 256]).init(device),
            decoder_stage_3: DecoderStageConfig::new(vec![256, 256, 256, 128]).init(device),
            decoder_stage_2: DecoderStageConfig::new(vec![128, 128, 64]).init(device),

            seg_block_1: ConvBlockConfig::new(64, 64).init(device),
            seg_block_2: ConvBlockConfig::new(64, self.seg_classes).init(device),
            edge_block_1: ConvBlockConfig::new(64, 64).init(device),
            edge_block_2: ConvBlockConfig::new(64, 1).init(device),
        }
    }

    fn assertions(&self) {
        let [height, width] = self.input_size;
        assert!(
            height % 32 == 0 && width % 32 == 0,
            "Input size must be divisible by 32 for the 5 pooling stages. Got {}x{}",
            height,
            width
        );
        assert!(
            self.num_classes >= 2,
            "Number of classes must be at least 2. Got {}",
            self.num_classes
        );
        assert!(
            self.seg_classes >= 2,
            "Number of segmentation classes must be at least 2. Got {}",
            self.seg_classes
        );
    }
}

impl<B: Backend> SegNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> SegNetPrediction<B> {
        let (x, pool_1) = self.encoder_stage_1.forward(images);
        let (x, pool_2) = self.encoder_stage_2.forward(x);
        let (x, pool_3) = self.encoder_stage_3.forward(x);
        let (x, pool_4) = self.encoder_stage_4.forward(x);
        let (x, pool_5) = self.encoder_stage_5.forward(x);

        let embedding = x.clone().flatten::<2>(1, 3);

        let class_logits = self
            .class_fc_1
            .forward(relu(self.class_fc_0.forward(embedding.clone())));
        let boxes = relu(self.bbox_fc_1.forward(relu(self.bbox_fc_0.forward(embedding))));

        let x = self.decoder_stage_5.forward(x, pool_5);
        let x = self.decoder_stage_4.forward(x, pool_4);
        let x = self.decoder_stage_3.forward(x, pool_3);
        let x = self.decoder_stage_2.forward(x, pool_2);

        let x = max_unpool2d(x, pool_1);

        let edges = self.edge_block_2.forward(self.edge_block_1.forward(x.clone()));

        let segmentation = self.seg_block_2.forward(self.seg_block_1.forward(x));

        SegNetPrediction {
            class_logits,
            boxes,
            segmentation,
            edges,
        }
    }

    /// Transplant pretrained filters into the encoder convolutions, in strict
    /// sequential order (VGG16 feature layout).
    ///
    /// Fails when the source layer count or any filter shape differs from the
    /// encoder's; nothing is copied partially.
    pub fn with_pretrained_encoder(mut self, source: &[Conv2d<B>]) -> Result<Self, ModelError> {
        if source.len() != ENCODER_CONVS {
            return Err(ModelError::PretrainedLayerCount {
                expected: ENCODER_CONVS,
                found: source.len(),
            });
        }

        let mut stages = [
            &mut self.encoder_stage_1,
            &mut self.encoder_stage_2,
            &mut self.encoder_stage_3,
            &mut self.encoder_stage_4,
            &mut self.encoder_stage_5,
        ];
        debug_assert_eq!(
            stages.iter().map(|stage| stage.conv_count()).sum::<usize>(),
            ENCODER_CONVS
        );

        let mut source_iter = source.iter().enumerate();
        for stage in stages.iter_mut() {
            for block in stage.conv_blocks_mut() {
                let (index, source_conv) = source_iter
                    .next()
                    .expect("layer count verified against ENCODER_CONVS");

                let expected = block.filter_shape();
                let found = source_conv.weight.dims();
                if expected != found {
                    return Err(ModelError::PretrainedFilterShape {
                        index,
                        expected,
                        found,
                    });
                }
            }
        }

        // All shapes verified; copy in a second pass so failure never leaves
        // a half-transplanted encoder.
        let mut source_iter = source.iter();
        for stage in stages.iter_mut() {
            for block in stage.conv_blocks_mut() {
                let source_conv = source_iter
                    .next()
                    .expect("layer count verified against ENCODER_CONVS");
                block.adopt_filters(source_conv);
            }
        }

        tracing::debug!(layers = ENCODER_CONVS, "transplanted pretrained encoder filters");

        Ok(self)
    }

    /// Filter shapes the pretrained source must match, in transplant order.
    pub fn encoder_filter_shapes() -> [[usize; 2]; ENCODER_CONVS] {
        [
            [3, 64],
            [64, 64],
            [64, 128],
            [128, 128],
            [128, 256],
            [256, 256],
            [256, 256],
            [256, 512],
            [512, 512],
            [512, 512],
            [512, 512],
            [512, 512],
            [512, 512],
        ]
    }

    #[cfg(feature = "training")]
    pub fn forward_multitask(&self, batch: MultiTaskBatch<B>) -> MultiTaskOutput<B> {
        let MultiTaskBatch {
            images,
            masks,
            boxes,
            labels,
            edges,
        } = batch;
        let device = images.device();

        let prediction = self.forward(images);

        let loss = MultiTaskLossConfig::new().init(&device).forward(
            &prediction,
            masks.clone(),
            labels.clone(),
            boxes,
            edges,
        );

        MultiTaskOutput::new(
            loss,
            prediction.class_logits,
            labels,
            prediction.segmentation,
            masks,
        )
    }
}

#[cfg(feature = "training")]
impl<B: AutodiffBackend> TrainStep<MultiTaskBatch<B>, MultiTaskOutput<B>> for SegNet<B> {
    fn step(&self, batch: MultiTaskBatch<B>) -> TrainOutput<MultiTaskOutput<B>> {
        let item = self.forward_multitask(batch);
        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "training")]
impl<B: Backend> ValidStep<MultiTaskBatch<B>, MultiTaskOutput<B>> for SegNet<B> {
    fn step(&self, batch: MultiTaskBatch<B>) -> MultiTaskOutput<B> {
        self.forward_multitask(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::conv::Conv2dConfig;
    use nn::PaddingConfig2d;

    type TestBackend = NdArray<f32>;

    fn vgg_like_convs(device: &<TestBackend as Backend>::Device) -> Vec<Conv2d<TestBackend>> {
        SegNet::<TestBackend>::encoder_filter_shapes()
            .iter()
            .map(|[input, output]| {
                Conv2dConfig::new([*input, *output], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device)
            })
            .collect()
    }

    #[test]
    fn pretrained_transplant_accepts_matching_source() {
        let device = Default::default();
        let model = SegNetConfig::new([32, 32]).init::<TestBackend>(&device);
        let source = vgg_like_convs(&device);

        assert!(model.with_pretrained_encoder(&source).is_ok());
    }

    #[test]
    fn pretrained_transplant_rejects_wrong_layer_count() {
        let device = Default::default();
        let model = SegNetConfig::new([32, 32]).init::<TestBackend>(&device);
        let mut source = vgg_like_convs(&device);
        source.pop();

        match model.with_pretrained_encoder(&source) {
            Err(ModelError::PretrainedLayerCount { expected, found }) => {
                assert_eq!(expected, 13);
                assert_eq!(found, 12);
            }
            other => panic!("expected layer count error, got {other:?}"),
        }
    }

    #[test]
    fn pretrained_transplant_rejects_wrong_filter_shape() {
        let device = Default::default();
        let model = SegNetConfig::new([32, 32]).init::<TestBackend>(&device);
        let mut source = vgg_like_convs(&device);
        source[3] = Conv2dConfig::new([128, 64], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(&device);

        match model.with_pretrained_encoder(&source) {
            Err(ModelError::PretrainedFilterShape { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected filter shape error, got {other:?}"),
        }
    }
}
