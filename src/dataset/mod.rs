mod lab;
mod multitask;

pub use lab::{LabContainer, convert_container_to_lab, lab_to_rgb, rgb_to_lab};
pub use multitask::{
    DatasetError, MultiTaskBatch, MultiTaskBatcher, MultiTaskConfig, MultiTaskContainer,
    MultiTaskDataset, MultiTaskRecord,
};
