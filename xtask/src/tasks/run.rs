use std::path::PathBuf;

use anyhow::Result;
use burn::prelude::*;
use clap::{ArgAction, Args};

use super::{eval, train, visualize};

#[derive(Args)]
pub struct RunArgs {
    #[arg(short, long)]
    pub data_dir: PathBuf,

    #[arg(short, long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    /// Train a model and save it under the artifact directory.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub train: bool,

    /// Evaluate on the test split.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub test: bool,

    /// Render prediction panels for a handful of test samples.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub visualize: bool,

    #[arg(short, long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(short, long, default_value_t = 4)]
    pub batch_size: usize,

    #[arg(short, long, default_value_t = 0.0003)]
    pub lr: f64,

    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 256)]
    pub image_size: usize,

    #[arg(long, default_value_t = 2)]
    pub num_classes: usize,

    #[arg(long, default_value_t = 2)]
    pub seg_classes: usize,

    /// Number of test samples rendered by the visualization phase.
    #[arg(long, default_value_t = 16)]
    pub samples: usize,

    /// Model file to evaluate/visualize when not training in the same run.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
}

/// Everything a phase needs, passed explicitly instead of living in
/// hard-coded globals.
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    pub data_dir: String,
    pub artifact_dir: String,
    #[config(default = "10")]
    pub epochs: usize,
    #[config(default = "4")]
    pub batch_size: usize,
    #[config(default = "3e-4")]
    pub learning_rate: f64,
    #[config(default = "4")]
    pub num_workers: usize,
    #[config(default = "42")]
    pub seed: u64,
    #[config(default = "[256, 256]")]
    pub image_size: [usize; 2],
    #[config(default = "2")]
    pub num_classes: usize,
    #[config(default = "2")]
    pub seg_classes: usize,
    #[config(default = "16")]
    pub visual_samples: usize,
}

impl ExperimentConfig {
    pub fn split_path(&self, split: &str) -> PathBuf {
        PathBuf::from(&self.data_dir).join(format!("{split}.bin"))
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.artifact_dir).join("model")
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = ExperimentConfig::new(
        args.data_dir.display().to_string(),
        args.artifact_dir.display().to_string(),
    )
    .with_epochs(args.epochs)
    .with_batch_size(args.batch_size)
    .with_learning_rate(args.lr)
    .with_num_workers(args.num_workers)
    .with_seed(args.seed)
    .with_image_size([args.image_size, args.image_size])
    .with_num_classes(args.num_classes)
    .with_seg_classes(args.seg_classes)
    .with_visual_samples(args.samples);

    if args.train {
        train::run_training(&config)?;
    }

    // After training, which recreates the artifact directory.
    std::fs::create_dir_all(&config.artifact_dir)?;
    config.save(PathBuf::from(&config.artifact_dir).join("experiment.json"))?;

    let checkpoint = args
        .checkpoint
        .clone()
        .unwrap_or_else(|| config.model_path());

    if args.test {
        eval::run_evaluation(&config, &checkpoint)?;
    }

    if args.visualize {
        visualize::run_visualization(&config, &checkpoint)?;
    }

    println!("Run complete.");
    Ok(())
}
