mod attention;
mod blocks;
mod segnet;

pub use attention::{AttentionBlock, AttentionBlockConfig};
pub use blocks::{
    ConvBlock, ConvBlockConfig, DecoderStage, DecoderStageConfig, EncoderStage, EncoderStageConfig,
    PoolIndices, max_unpool2d,
};
pub use segnet::{ModelError, SegNet, SegNetConfig, SegNetPrediction};
