use std::marker::PhantomData;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

/// Mean intersection-over-union of the argmaxed segmentation map, averaged
/// over the classes present in either prediction or target.
#[derive(Default)]
pub struct SegmentationIoUMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

#[derive(new)]
pub struct SegmentationIoUInput<B: Backend> {
    /// `[batch, classes, height, width]` class scores.
    outputs: Tensor<B, 4>,
    /// `[batch, 1, height, width]` class ids.
    targets: Tensor<B, 4, Int>,
}

impl<B: Backend> SegmentationIoUMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for SegmentationIoUMetric<B> {
    type Input = SegmentationIoUInput<B>;
    const NAME: &'static str = "Segmentation IoU";

    fn update(&mut self, input: &SegmentationIoUInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let outputs = input.outputs.clone();
        let targets = input.targets.clone();

        let [batch_size, n_classes, _height, _width] = outputs.dims();

        let predictions = outputs.argmax(1);

        let mut total_iou = 0.0;
        let mut valid_classes = 0;

        for class_idx in 0..n_classes {
            let target_mask = targets.clone().equal_elem(class_idx as i64).float();
            let pred_mask = predictions.clone().equal_elem(class_idx as i64).float();

            let intersection = (target_mask.clone() * pred_mask.clone())
                .sum()
                .into_scalar()
                .elem::<f64>();
            let union = (target_mask.clone() + pred_mask.clone()
                - (target_mask * pred_mask))
                .sum()
                .into_scalar()
                .elem::<f64>();

            if union > 0.0 {
                total_iou += intersection / union;
                valid_classes += 1;
            }
        }

        let iou = if valid_classes > 0 {
            total_iou / valid_classes as f64
        } else {
            0.0
        };

        self.state.update(
            100.0 * iou,
            batch_size,
            FormatOptions::new(Self::NAME).unit("%").precision(2),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for SegmentationIoUMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataloader::Progress;

    type TestBackend = NdArray<f32>;

    fn metadata() -> MetricMetadata {
        MetricMetadata {
            progress: Progress {
                items_processed: 1,
                items_total: 1,
            },
            epoch: 1,
            epoch_total: 1,
            iteration: 1,
            lr: None,
        }
    }

    #[test]
    fn perfect_prediction_scores_full_iou() {
        let device = Default::default();
        let mut metric = SegmentationIoUMetric::<TestBackend>::new();

        // Class 1 on the left half, class 0 on the right; scores match the
        // target exactly after argmax.
        let targets = Tensor::<TestBackend, 4, Int>::from_ints(
            [[[[1, 1, 0, 0], [1, 1, 0, 0]]]],
            &device,
        );
        let scores = Tensor::<TestBackend, 4>::from_floats(
            [[
                [[0.0, 0.0, 1.0, 1.0], [0.0, 0.0, 1.0, 1.0]],
                [[1.0, 1.0, 0.0, 0.0], [1.0, 1.0, 0.0, 0.0]],
            ]],
            &device,
        );

        metric.update(&SegmentationIoUInput::new(scores, targets), &metadata());

        assert!((metric.value() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_prediction_scores_zero() {
        let device = Default::default();
        let mut metric = SegmentationIoUMetric::<TestBackend>::new();

        let targets = Tensor::<TestBackend, 4, Int>::zeros([1, 1, 2, 2], &device);
        // Every pixel predicted as class 1 while the target is class 0.
        let scores = Tensor::<TestBackend, 4>::from_floats(
            [[[[0.0, 0.0], [0.0, 0.0]], [[1.0, 1.0], [1.0, 1.0]]]],
            &device,
        );

        metric.update(&SegmentationIoUInput::new(scores, targets), &metadata());

        assert!(metric.value() < 1e-6);
    }
}
