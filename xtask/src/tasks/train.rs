use anyhow::Result;
use burn::data::dataloader::Dataset;
use burn::train::metric::{AccuracyMetric, LossMetric};
use burn::{
    data::dataloader::DataLoaderBuilder,
    optim::AdamConfig,
    prelude::*,
    record::CompactRecorder,
    train::LearnerBuilder,
};
use burn_segnet::{
    SegNetConfig, SegmentationIoUMetric,
    dataset::{MultiTaskBatcher, MultiTaskConfig, MultiTaskDataset},
};

use super::{InferenceBackend, TrainingBackend, run::ExperimentConfig};

fn create_artifact_dir(artifact_dir: &str) {
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).ok();
}

pub fn run_training(config: &ExperimentConfig) -> Result<()> {
    create_artifact_dir(&config.artifact_dir);

    println!("Initializing device...");
    let device = <InferenceBackend as Backend>::Device::default();

    TrainingBackend::seed(config.seed);

    let batch_config = MultiTaskConfig::new(config.image_size)
        .with_num_classes(config.num_classes)
        .with_seg_classes(config.seg_classes);

    println!(
        "Loading training dataset from {}...",
        config.split_path("train").display()
    );
    let train_dataset = MultiTaskDataset::from_container(&config.split_path("train"))?;
    println!("Loaded {} samples (training dataset)", train_dataset.len());

    println!(
        "Loading validation dataset from {}...",
        config.split_path("val").display()
    );
    let valid_dataset = MultiTaskDataset::from_container(&config.split_path("val"))?;
    println!("Loaded {} samples (validation dataset)", valid_dataset.len());

    println!("Creating data batchers...");
    let batcher_train =
        MultiTaskBatcher::<TrainingBackend>::new(device.clone(), batch_config.clone());
    let batcher_valid =
        MultiTaskBatcher::<InferenceBackend>::new(device.clone(), batch_config.clone());

    println!(
        "Building dataloaders with batch size {}...",
        config.batch_size
    );
    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .shuffle(config.seed)
        .build(train_dataset);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .build(valid_dataset);

    println!("Creating SegNet model for {:?} input...", config.image_size);
    let model = SegNetConfig::new(config.image_size)
        .with_num_classes(config.num_classes)
        .with_seg_classes(config.seg_classes)
        .init::<TrainingBackend>(&device);

    println!(
        "Initializing Adam optimizer with learning rate {}...",
        config.learning_rate
    );
    let optimizer = AdamConfig::new().init();

    println!("Building learner...");
    let learner = LearnerBuilder::new(&config.artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(SegmentationIoUMetric::new())
        .metric_valid_numeric(SegmentationIoUMetric::new())
        .devices(vec![device.clone()])
        .num_epochs(config.epochs)
        .summary()
        .with_file_checkpointer(CompactRecorder::new())
        .build(model, optimizer, config.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_valid);

    println!("Saving model to {}...", config.model_path().display());
    model_trained.save_file(config.model_path(), &CompactRecorder::new())?;

    println!("Training completed successfully!");
    Ok(())
}
