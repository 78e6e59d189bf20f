use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use bincode::{Decode, Encode};
use burn::data::dataset::{Dataset, InMemDataset};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("container io: {0}")]
    Io(#[from] std::io::Error),

    #[error("container decode: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("container encode: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("malformed container: {0}")]
    Malformed(String),
}

#[derive(Config, Debug)]
pub struct MultiTaskConfig {
    pub image_size: [usize; 2],
    #[config(default = "2")]
    pub num_classes: usize,
    #[config(default = "2")]
    pub seg_classes: usize,
    pub class_names: Option<Vec<String>>,
}

impl Default for MultiTaskConfig {
    fn default() -> Self {
        Self {
            image_size: [256, 256],
            num_classes: 2,
            seg_classes: 2,
            class_names: None,
        }
    }
}

/// One stored sample: an RGB image, its per-pixel class-id mask, one
/// bounding box as `[x0, y0, x1, y1]` pixels and one scalar class label.
/// Never mutated after load.
#[derive(Encode, Decode, Clone, Debug)]
pub struct MultiTaskRecord {
    /// Interleaved HWC RGB bytes, `3 * height * width` long.
    pub image: Vec<u8>,
    /// Class ids, `height * width` long.
    pub mask: Vec<u8>,
    pub bbox: [f32; 4],
    pub label: u32,
}

/// On-disk split container: every split (train/val/test) is one
/// bincode-encoded file holding all its paired arrays.
#[derive(Encode, Decode, Clone, Debug)]
pub struct MultiTaskContainer {
    pub image_size: [u32; 2],
    pub samples: Vec<MultiTaskRecord>,
}

impl MultiTaskContainer {
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let container: Self =
            bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
        container.validate()?;

        Ok(container)
    }

    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        self.validate()?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::encode_into_std_write(self, &mut writer, bincode::config::standard())?;

        Ok(())
    }

    fn validate(&self) -> Result<(), DatasetError> {
        let [height, width] = self.image_size;
        let pixels = (height * width) as usize;

        for (index, sample) in self.samples.iter().enumerate() {
            if sample.image.len() != pixels * 3 {
                return Err(DatasetError::Malformed(format!(
                    "sample {index}: image has {} bytes, expected {}",
                    sample.image.len(),
                    pixels * 3
                )));
            }
            if sample.mask.len() != pixels {
                return Err(DatasetError::Malformed(format!(
                    "sample {index}: mask has {} bytes, expected {pixels}",
                    sample.mask.len()
                )));
            }
        }

        Ok(())
    }
}

/// In-memory dataset over one split container.
pub struct MultiTaskDataset {
    image_size: [usize; 2],
    dataset: InMemDataset<MultiTaskRecord>,
}

impl MultiTaskDataset {
    pub fn from_container(path: &Path) -> Result<Self, DatasetError> {
        let container = MultiTaskContainer::read(path)?;

        tracing::info!(
            samples = container.samples.len(),
            path = %path.display(),
            "loaded multi-task container"
        );

        Ok(Self {
            image_size: [container.image_size[0] as usize, container.image_size[1] as usize],
            dataset: InMemDataset::new(container.samples),
        })
    }

    pub fn image_size(&self) -> [usize; 2] {
        self.image_size
    }
}

impl Dataset<MultiTaskRecord> for MultiTaskDataset {
    fn get(&self, index: usize) -> Option<MultiTaskRecord> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

#[derive(Clone)]
pub struct MultiTaskBatcher<B: Backend> {
    device: B::Device,
    config: MultiTaskConfig,
}

impl<B: Backend> MultiTaskBatcher<B> {
    pub fn new(device: B::Device, config: MultiTaskConfig) -> Self {
        Self { device, config }
    }
}

#[derive(Clone, Debug)]
pub struct MultiTaskBatch<B: Backend> {
    /// `[batch, 3, height, width]`, scaled to [0, 1].
    pub images: Tensor<B, 4, Float>,
    /// `[batch, 1, height, width]` class ids.
    pub masks: Tensor<B, 4, Int>,
    /// `[batch, 4]` boxes as `[x0, y0, x1, y1]` pixels.
    pub boxes: Tensor<B, 2, Float>,
    /// `[batch]` class labels.
    pub labels: Tensor<B, 1, Int>,
    /// `[batch, 1, height, width]` mask-boundary targets for the edge head.
    pub edges: Tensor<B, 4, Float>,
}

impl<B: Backend> Batcher<MultiTaskRecord, MultiTaskBatch<B>> for MultiTaskBatcher<B> {
    fn batch(&self, items: Vec<MultiTaskRecord>) -> MultiTaskBatch<B> {
        let batch_size = items.len();
        let [height, width] = self.config.image_size;

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);
        let mut edges = Vec::with_capacity(batch_size);
        let mut boxes = Vec::with_capacity(batch_size * 4);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            let mut image_data = Vec::with_capacity(3 * height * width);
            for c in 0..3 {
                for y in 0..height {
                    for x in 0..width {
                        let idx = (y * width + x) * 3 + c;
                        let val = item.image.get(idx).copied().unwrap_or(0) as f32 / 255.0;
                        image_data.push(val);
                    }
                }
            }
            images.push(Tensor::<B, 3>::from_data(
                TensorData::new(image_data, Shape::new([3, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            ));

            let mask_data: Vec<i32> = item.mask.iter().map(|&id| id as i32).collect();
            masks.push(Tensor::<B, 3, Int>::from_data(
                TensorData::new(mask_data, Shape::new([1, height, width]))
                    .convert::<B::IntElem>(),
                &self.device,
            ));

            let edge_data = boundary_map(&item.mask, height, width);
            edges.push(Tensor::<B, 3>::from_data(
                TensorData::new(edge_data, Shape::new([1, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            ));

            boxes.extend_from_slice(&item.bbox);
            labels.push(item.label as i32);
        }

        let images: Tensor<B, 4> = Tensor::stack::<4>(images, 0);
        let masks: Tensor<B, 4, Int> = Tensor::stack::<4>(masks, 0);
        let edges: Tensor<B, 4> = Tensor::stack::<4>(edges, 0);
        let boxes = Tensor::<B, 2>::from_data(
            TensorData::new(boxes, Shape::new([batch_size, 4])).convert::<B::FloatElem>(),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, Shape::new([batch_size])).convert::<B::IntElem>(),
            &self.device,
        );

        MultiTaskBatch {
            images,
            masks,
            boxes,
            labels,
            edges,
        }
    }
}

/// 1.0 wherever a pixel's class id differs from a 4-neighbour, else 0.0.
/// Used as the auxiliary edge head's supervision target.
fn boundary_map(mask: &[u8], height: usize, width: usize) -> Vec<f32> {
    let mut edges = vec![0.0f32; height * width];

    for y in 0..height {
        for x in 0..width {
            let id = mask[y * width + x];
            let differs = (x + 1 < width && mask[y * width + x + 1] != id)
                || (x > 0 && mask[y * width + x - 1] != id)
                || (y + 1 < height && mask[(y + 1) * width + x] != id)
                || (y > 0 && mask[(y - 1) * width + x] != id);

            if differs {
                edges[y * width + x] = 1.0;
            }
        }
    }

    edges
}
