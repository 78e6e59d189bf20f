pub mod model;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "training")]
pub mod training;

pub use model::SegNet;
pub use model::SegNetConfig;

#[cfg(feature = "dataset")]
pub use dataset::{MultiTaskBatch, MultiTaskConfig, MultiTaskDataset, MultiTaskRecord};

#[cfg(feature = "training")]
pub use training::{MultiTaskLoss, MultiTaskLossConfig, MultiTaskOutput, SegmentationIoUMetric};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
