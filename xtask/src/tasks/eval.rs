use std::path::Path;

use anyhow::Result;
use burn::data::dataloader::{DataLoaderBuilder, Dataset};
use burn::record::CompactRecorder;
use burn::prelude::*;
use burn_segnet::{
    SegNetConfig,
    dataset::{MultiTaskBatcher, MultiTaskConfig, MultiTaskDataset},
};

use super::{InferenceBackend, run::ExperimentConfig};

/// Run the frozen model over the test split and aggregate task losses and
/// metrics.
pub fn run_evaluation(config: &ExperimentConfig, checkpoint: &Path) -> Result<()> {
    let device = <InferenceBackend as Backend>::Device::default();

    println!("Loading model from {}...", checkpoint.display());
    let model = SegNetConfig::new(config.image_size)
        .with_num_classes(config.num_classes)
        .with_seg_classes(config.seg_classes)
        .init::<InferenceBackend>(&device)
        .load_file(checkpoint, &CompactRecorder::new(), &device)?;

    println!(
        "Loading test dataset from {}...",
        config.split_path("test").display()
    );
    let test_dataset = MultiTaskDataset::from_container(&config.split_path("test"))?;
    println!("Loaded {} samples (test dataset)", test_dataset.len());

    let batch_config = MultiTaskConfig::new(config.image_size)
        .with_num_classes(config.num_classes)
        .with_seg_classes(config.seg_classes);
    let batcher = MultiTaskBatcher::<InferenceBackend>::new(device.clone(), batch_config);

    let dataloader = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .build(test_dataset);

    let mut total_loss = 0.0f64;
    let mut total_samples = 0usize;
    let mut correct_labels = 0.0f64;
    let mut pixel_accuracy_sum = 0.0f64;
    let mut batches = 0usize;

    for batch in dataloader.iter() {
        let output = model.forward_multitask(batch);

        let batch_size = output.class_targets.dims()[0];

        let loss = output.loss.into_scalar().elem::<f64>();
        total_loss += loss * batch_size as f64;

        let correct = output
            .class_output
            .argmax(1)
            .reshape([batch_size])
            .equal(output.class_targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<f64>();
        correct_labels += correct;

        let pixel_accuracy = output
            .seg_output
            .argmax(1)
            .equal(output.seg_targets)
            .float()
            .mean()
            .into_scalar()
            .elem::<f64>();
        pixel_accuracy_sum += pixel_accuracy;

        total_samples += batch_size;
        batches += 1;
    }

    if total_samples == 0 {
        println!("Test split is empty; nothing to evaluate.");
        return Ok(());
    }

    println!("Test loss: {:.4}", total_loss / total_samples as f64);
    println!(
        "Classification accuracy: {:.2}%",
        100.0 * correct_labels / total_samples as f64
    );
    println!(
        "Pixel accuracy: {:.2}%",
        100.0 * pixel_accuracy_sum / batches as f64
    );

    Ok(())
}
