pub mod learner;
pub mod loss;
pub mod metrics;

pub use learner::MultiTaskOutput;
pub use loss::{MultiTaskLoss, MultiTaskLossConfig};
pub use metrics::SegmentationIoUMetric;
