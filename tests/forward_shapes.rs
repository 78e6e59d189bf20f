use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_segnet::SegNetConfig;

type TestBackend = NdArray<f32>;

#[test]
fn forward_produces_documented_output_shapes() {
    let device = Default::default();
    let model = SegNetConfig::new([64, 64]).init::<TestBackend>(&device);

    let images = Tensor::<TestBackend, 4>::random(
        [2, 3, 64, 64],
        Distribution::Default,
        &device,
    );
    let prediction = model.forward(images);

    assert_eq!(prediction.class_logits.dims(), [2, 2]);
    assert_eq!(prediction.boxes.dims(), [2, 4]);
    assert_eq!(prediction.segmentation.dims(), [2, 2, 64, 64]);
    assert_eq!(prediction.edges.dims(), [2, 1, 64, 64]);
}

#[test]
fn forward_respects_configured_class_counts() {
    let device = Default::default();
    let model = SegNetConfig::new([32, 32])
        .with_num_classes(5)
        .with_seg_classes(3)
        .init::<TestBackend>(&device);

    let images = Tensor::<TestBackend, 4>::random(
        [1, 3, 32, 32],
        Distribution::Default,
        &device,
    );
    let prediction = model.forward(images);

    assert_eq!(prediction.class_logits.dims(), [1, 5]);
    assert_eq!(prediction.segmentation.dims(), [1, 3, 32, 32]);
}

#[test]
fn predicted_boxes_are_non_negative() {
    let device = Default::default();
    let model = SegNetConfig::new([32, 32]).init::<TestBackend>(&device);

    let images = Tensor::<TestBackend, 4>::random(
        [2, 3, 32, 32],
        Distribution::Default,
        &device,
    );
    let boxes = model
        .forward(images)
        .boxes
        .into_data()
        .to_vec::<f32>()
        .expect("box data");

    assert!(boxes.iter().all(|&coordinate| coordinate >= 0.0));
}
