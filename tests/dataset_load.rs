use burn::backend::NdArray;
use burn::data::dataloader::Dataset;
use burn::data::dataloader::batcher::Batcher;
use burn_segnet::dataset::{
    LabContainer, MultiTaskBatcher, MultiTaskConfig, MultiTaskContainer, MultiTaskDataset,
    MultiTaskRecord, convert_container_to_lab,
};

type TestBackend = NdArray<f32>;

const HEIGHT: usize = 16;
const WIDTH: usize = 16;

fn sample(label: u32) -> MultiTaskRecord {
    let mut mask = vec![0u8; HEIGHT * WIDTH];
    for y in HEIGHT / 2..HEIGHT {
        for x in WIDTH / 2..WIDTH {
            mask[y * WIDTH + x] = 1;
        }
    }

    MultiTaskRecord {
        image: (0..3 * HEIGHT * WIDTH).map(|i| (i % 256) as u8).collect(),
        mask,
        bbox: [
            WIDTH as f32 / 2.0,
            HEIGHT as f32 / 2.0,
            WIDTH as f32 - 1.0,
            HEIGHT as f32 - 1.0,
        ],
        label,
    }
}

fn container() -> MultiTaskContainer {
    MultiTaskContainer {
        image_size: [HEIGHT as u32, WIDTH as u32],
        samples: vec![sample(0), sample(1), sample(1)],
    }
}

#[test]
fn container_round_trips_through_dataset_and_batcher() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("train.bin");
    container().write(&path).expect("write container");

    let dataset = MultiTaskDataset::from_container(&path).expect("read container");
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.image_size(), [HEIGHT, WIDTH]);

    let first = dataset.get(0).expect("first record");
    assert_eq!(first.label, 0);
    assert_eq!(first.mask[(HEIGHT - 1) * WIDTH + WIDTH - 1], 1);

    let config = MultiTaskConfig::new([HEIGHT, WIDTH]);
    let batcher = MultiTaskBatcher::<TestBackend>::new(Default::default(), config);
    let records: Vec<_> = (0..dataset.len())
        .map(|index| dataset.get(index).expect("record"))
        .collect();
    let batch = batcher.batch(records);

    assert_eq!(batch.images.dims(), [3, 3, HEIGHT, WIDTH]);
    assert_eq!(batch.masks.dims(), [3, 1, HEIGHT, WIDTH]);
    assert_eq!(batch.boxes.dims(), [3, 4]);
    assert_eq!(batch.labels.dims(), [3]);
    assert_eq!(batch.edges.dims(), [3, 1, HEIGHT, WIDTH]);

    let labels = batch
        .labels
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .expect("label data");
    assert_eq!(labels, vec![0, 1, 1]);
}

#[test]
fn lab_conversion_writes_parallel_container() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("train.bin");
    let output = dir.path().join("train_lab.bin");
    container().write(&input).expect("write container");

    convert_container_to_lab(&input, &output).expect("convert to Lab");

    let lab = LabContainer::read(&output).expect("read Lab container");
    assert_eq!(lab.image_size, [HEIGHT as u32, WIDTH as u32]);
    assert_eq!(lab.images.len(), 3);
    assert!(lab.images.iter().all(|image| image.len() == 3 * HEIGHT * WIDTH));
}

#[test]
fn truncated_container_is_rejected_on_read() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("train.bin");
    container().write(&path).expect("write container");

    let bytes = std::fs::read(&path).expect("read bytes");
    std::fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");

    assert!(MultiTaskDataset::from_container(&path).is_err());
}
