use std::path::Path;

use anyhow::{Context, Result};
use burn::data::dataloader::Dataset;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn_segnet::{
    SegNetConfig,
    dataset::{MultiTaskBatcher, MultiTaskConfig, MultiTaskDataset, MultiTaskRecord},
};
use image::{Rgb, RgbImage};

use super::{InferenceBackend, run::ExperimentConfig};

const PALETTE: [[u8; 3]; 6] = [
    [0, 0, 0],
    [255, 255, 255],
    [228, 26, 28],
    [55, 126, 184],
    [77, 175, 74],
    [152, 78, 163],
];

/// Render a handful of test samples as side-by-side panels: the input image
/// with ground-truth (green) and predicted (red) boxes, the ground-truth
/// mask and the predicted mask.
pub fn run_visualization(config: &ExperimentConfig, checkpoint: &Path) -> Result<()> {
    let device = <InferenceBackend as Backend>::Device::default();

    println!("Loading model from {}...", checkpoint.display());
    let model = SegNetConfig::new(config.image_size)
        .with_num_classes(config.num_classes)
        .with_seg_classes(config.seg_classes)
        .init::<InferenceBackend>(&device)
        .load_file(checkpoint, &CompactRecorder::new(), &device)?;

    let test_dataset = MultiTaskDataset::from_container(&config.split_path("test"))?;
    let available = test_dataset.len();
    if available == 0 {
        println!("Test split is empty; nothing to visualize.");
        return Ok(());
    }

    // Evenly spaced deterministic sample of the split.
    let count = config.visual_samples.min(available);
    let stride = (available / count).max(1);
    let records: Vec<MultiTaskRecord> = (0..count)
        .map(|index| {
            test_dataset
                .get(index * stride)
                .context("sample index out of range")
        })
        .collect::<Result<_>>()?;

    let batch_config = MultiTaskConfig::new(config.image_size)
        .with_num_classes(config.num_classes)
        .with_seg_classes(config.seg_classes);
    let batcher = MultiTaskBatcher::<InferenceBackend>::new(device.clone(), batch_config);
    let batch = batcher.batch(records.clone());

    let prediction = model.forward(batch.images);

    let [height, width] = config.image_size;

    let predicted_masks = prediction
        .segmentation
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .expect("predicted mask data");
    let predicted_boxes = prediction
        .boxes
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .expect("predicted box data");

    let out_dir = Path::new(&config.artifact_dir).join("visualizations");
    std::fs::create_dir_all(&out_dir)?;

    for (index, record) in records.iter().enumerate() {
        let mut panel = RgbImage::new((width * 3) as u32, height as u32);

        // Input image.
        for y in 0..height {
            for x in 0..width {
                let base = (y * width + x) * 3;
                panel.put_pixel(
                    x as u32,
                    y as u32,
                    Rgb([
                        record.image[base],
                        record.image[base + 1],
                        record.image[base + 2],
                    ]),
                );
            }
        }

        // Ground-truth and predicted masks.
        for y in 0..height {
            for x in 0..width {
                let gt_class = record.mask[y * width + x] as usize;
                panel.put_pixel(
                    (width + x) as u32,
                    y as u32,
                    Rgb(PALETTE[gt_class % PALETTE.len()]),
                );

                let pred_class =
                    predicted_masks[index * height * width + y * width + x] as usize;
                panel.put_pixel(
                    (2 * width + x) as u32,
                    y as u32,
                    Rgb(PALETTE[pred_class % PALETTE.len()]),
                );
            }
        }

        draw_box(&mut panel, record.bbox, [0, 255, 0], width, height);
        let predicted_box = [
            predicted_boxes[index * 4],
            predicted_boxes[index * 4 + 1],
            predicted_boxes[index * 4 + 2],
            predicted_boxes[index * 4 + 3],
        ];
        draw_box(&mut panel, predicted_box, [255, 0, 0], width, height);

        let path = out_dir.join(format!("sample_{index:02}.png"));
        panel.save(&path)?;
    }

    println!(
        "Wrote {} visualization panels to {}",
        records.len(),
        out_dir.display()
    );
    Ok(())
}

/// Outline a `[x0, y0, x1, y1]` pixel box on the input (leftmost) panel.
fn draw_box(panel: &mut RgbImage, bbox: [f32; 4], color: [u8; 3], width: usize, height: usize) {
    let clamp_x = |v: f32| (v.round().max(0.0) as usize).min(width - 1);
    let clamp_y = |v: f32| (v.round().max(0.0) as usize).min(height - 1);

    let (x0, y0) = (clamp_x(bbox[0]), clamp_y(bbox[1]));
    let (x1, y1) = (clamp_x(bbox[2]), clamp_y(bbox[3]));

    for x in x0..=x1 {
        panel.put_pixel(x as u32, y0 as u32, Rgb(color));
        panel.put_pixel(x as u32, y1 as u32, Rgb(color));
    }
    for y in y0..=y1 {
        panel.put_pixel(x0 as u32, y as u32, Rgb(color));
        panel.put_pixel(x1 as u32, y as u32, Rgb(color));
    }
}
