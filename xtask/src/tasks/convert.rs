use std::path::PathBuf;

use anyhow::Result;
use burn_segnet::dataset::convert_container_to_lab;
use clap::Args;

#[derive(Args)]
pub struct ConvertLabArgs {
    /// Directory holding the train/val/test split containers.
    #[arg(short, long)]
    pub data_dir: PathBuf,
}

/// Convert each split container to a sibling Lab colour-space container.
pub fn run(args: &ConvertLabArgs) -> Result<()> {
    for split in ["train", "val", "test"] {
        let input = args.data_dir.join(format!("{split}.bin"));
        let output = args.data_dir.join(format!("{split}_lab.bin"));

        println!("Converting {} -> {}...", input.display(), output.display());
        convert_container_to_lab(&input, &output)?;
    }

    println!("Lab conversion complete.");
    Ok(())
}
