use burn::backend::NdArray;
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::Distribution;
use burn_segnet::SegNetConfig;

type TestBackend = NdArray<f32>;

fn to_vec<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().expect("tensor data")
}

#[test]
fn reloaded_checkpoint_reproduces_outputs_exactly() {
    let device = Default::default();
    TestBackend::seed(7);

    let config = SegNetConfig::new([32, 32]);
    let model = config.init::<TestBackend>(&device);
    let images = Tensor::<TestBackend, 4>::random(
        [1, 3, 32, 32],
        Distribution::Default,
        &device,
    );

    let before = model.forward(images.clone());

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("segnet");
    model
        .clone()
        .save_file(&path, &CompactRecorder::new())
        .expect("save checkpoint");

    let reloaded = config
        .init::<TestBackend>(&device)
        .load_file(&path, &CompactRecorder::new(), &device)
        .expect("load checkpoint");

    let after = reloaded.forward(images);

    assert_eq!(to_vec(before.class_logits), to_vec(after.class_logits));
    assert_eq!(to_vec(before.boxes), to_vec(after.boxes));
    assert_eq!(to_vec(before.segmentation), to_vec(after.segmentation));
    assert_eq!(to_vec(before.edges), to_vec(after.edges));
}
