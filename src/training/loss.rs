use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig, MseLoss, Reduction},
    prelude::*,
};

use crate::model::SegNetPrediction;

/// Cross-entropy over per-pixel class scores.
///
/// Flattens `[batch, classes, height, width]` predictions and
/// `[batch, 1, height, width]` targets into the `[pixels, classes]` /
/// `[pixels]` pair the standard cross-entropy expects.
#[derive(Config, Debug)]
pub struct SegmentationCrossEntropyLossConfig {
    /// Optional per-class weights for imbalanced masks.
    pub weights: Option<Vec<f32>>,
}

impl SegmentationCrossEntropyLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegmentationCrossEntropyLoss<B> {
        self.assertions();

        SegmentationCrossEntropyLoss {
            inner: CrossEntropyLossConfig::new()
                .with_weights(self.weights.clone())
                .init(device),
        }
    }

    fn assertions(&self) {
        if let Some(weights) = self.weights.as_ref() {
            assert!(
                weights.iter().all(|weight| weight > &0.),
                "Weights of cross-entropy have to be positive."
            );
        }
    }
}

#[derive(Module, Debug)]
pub struct SegmentationCrossEntropyLoss<B: Backend> {
    inner: CrossEntropyLoss<B>,
}

impl<B: Backend> SegmentationCrossEntropyLoss<B> {
    pub fn forward(&self, predictions: Tensor<B, 4>, targets: Tensor<B, 4, Int>) -> Tensor<B, 1> {
        Self::assertions(&predictions, &targets);

        let [batch_size, num_classes, height, width] = predictions.dims();

        let predictions: Tensor<B, 2> = predictions
            .reshape([batch_size, num_classes, height * width])
            .permute([0, 2, 1])
            .reshape([batch_size * height * width, num_classes]);
        let targets: Tensor<B, 1, Int> = targets.reshape([batch_size * height * width]);

        self.inner.forward(predictions, targets)
    }

    fn assertions(predictions: &Tensor<B, 4>, targets: &Tensor<B, 4, Int>) {
        let prediction_dims = predictions.dims();
        let target_dims = targets.dims();

        assert!(
            prediction_dims[0] == target_dims[0],
            "Batch size mismatch: predictions ({}) vs targets ({})",
            prediction_dims[0],
            target_dims[0]
        );
        assert!(
            prediction_dims[2] == target_dims[2] && prediction_dims[3] == target_dims[3],
            "Spatial dimensions mismatch: predictions ({},{}) vs targets ({},{})",
            prediction_dims[2],
            prediction_dims[3],
            target_dims[2],
            target_dims[3]
        );
        assert!(
            target_dims[1] == 1,
            "Targets should have 1 channel with class indices, got {}",
            target_dims[1]
        );
    }
}

/// Weighted sum of the four task losses: segmentation cross-entropy,
/// classification cross-entropy, bounding-box MSE and edge-map MSE.
#[derive(Config, Debug)]
pub struct MultiTaskLossConfig {
    #[config(default = 1.0)]
    pub seg_weight: f32,

    #[config(default = 1.0)]
    pub class_weight: f32,

    #[config(default = 1.0)]
    pub bbox_weight: f32,

    /// Set to 0.0 to leave the auxiliary edge head unsupervised.
    #[config(default = 1.0)]
    pub edge_weight: f32,

    pub seg_class_weights: Option<Vec<f32>>,
}

impl MultiTaskLossConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiTaskLoss<B> {
        self.assertions();

        MultiTaskLoss {
            segmentation: SegmentationCrossEntropyLossConfig::new()
                .with_weights(self.seg_class_weights.clone())
                .init(device),
            classification: CrossEntropyLossConfig::new().init(device),
            seg_weight: self.seg_weight,
            class_weight: self.class_weight,
            bbox_weight: self.bbox_weight,
            edge_weight: self.edge_weight,
        }
    }

    fn assertions(&self) {
        for (name, weight) in [
            ("seg_weight", self.seg_weight),
            ("class_weight", self.class_weight),
            ("bbox_weight", self.bbox_weight),
            ("edge_weight", self.edge_weight),
        ] {
            assert!(
                weight >= 0.,
                "Task loss weight {} must be non-negative. Got {}",
                name,
                weight
            );
        }
    }
}

#[derive(Module, Debug)]
pub struct MultiTaskLoss<B: Backend> {
    segmentation: SegmentationCrossEntropyLoss<B>,
    classification: CrossEntropyLoss<B>,
    pub seg_weight: f32,
    pub class_weight: f32,
    pub bbox_weight: f32,
    pub edge_weight: f32,
}

impl<B: Backend> MultiTaskLoss<B> {
    /// Combined scalar loss over all task heads.
    pub fn forward(
        &self,
        prediction: &SegNetPrediction<B>,
        masks: Tensor<B, 4, Int>,
        labels: Tensor<B, 1, Int>,
        boxes: Tensor<B, 2>,
        edges: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        let seg_loss = self
            .segmentation
            .forward(prediction.segmentation.clone(), masks);
        let class_loss = self
            .classification
            .forward(prediction.class_logits.clone(), labels);
        let bbox_loss = MseLoss::new().forward(prediction.boxes.clone(), boxes, Reduction::Mean);
        let edge_loss = MseLoss::new().forward(prediction.edges.clone(), edges, Reduction::Mean);

        seg_loss.mul_scalar(self.seg_weight)
            + class_loss.mul_scalar(self.class_weight)
            + bbox_loss.mul_scalar(self.bbox_weight)
            + edge_loss.mul_scalar(self.edge_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn combined_loss_is_finite_and_positive() {
        let device = Default::default();
        let loss = MultiTaskLossConfig::new().init::<TestBackend>(&device);

        let prediction = SegNetPrediction {
            class_logits: Tensor::random([2, 2], Distribution::Default, &device),
            boxes: Tensor::random([2, 4], Distribution::Default, &device),
            segmentation: Tensor::random([2, 2, 8, 8], Distribution::Default, &device),
            edges: Tensor::random([2, 1, 8, 8], Distribution::Default, &device),
        };

        let masks = Tensor::<TestBackend, 4, Int>::zeros([2, 1, 8, 8], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 1], &device);
        let boxes = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 5.0, 5.0]; 2], &device);
        let edges = Tensor::<TestBackend, 4>::zeros([2, 1, 8, 8], &device);

        let value: f32 = loss
            .forward(&prediction, masks, labels, boxes, edges)
            .into_scalar();

        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn zero_edge_weight_removes_edge_term() {
        let device = Default::default();
        let weighted = MultiTaskLossConfig::new().init::<TestBackend>(&device);
        let unweighted = MultiTaskLossConfig::new()
            .with_edge_weight(0.0)
            .init::<TestBackend>(&device);

        let prediction = SegNetPrediction {
            class_logits: Tensor::zeros([1, 2], &device),
            boxes: Tensor::zeros([1, 4], &device),
            segmentation: Tensor::zeros([1, 2, 4, 4], &device),
            edges: Tensor::ones([1, 1, 4, 4], &device),
        };

        let masks = Tensor::<TestBackend, 4, Int>::zeros([1, 1, 4, 4], &device);
        let labels = Tensor::<TestBackend, 1, Int>::zeros([1], &device);
        let boxes = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        // Edge target disagrees with the prediction everywhere.
        let edges = Tensor::<TestBackend, 4>::zeros([1, 1, 4, 4], &device);

        let with_edges: f32 = weighted
            .forward(&prediction, masks.clone(), labels.clone(), boxes.clone(), edges.clone())
            .into_scalar();
        let without_edges: f32 = unweighted
            .forward(&prediction, masks, labels, boxes, edges)
            .into_scalar();

        assert!(with_edges > without_edges);
    }
}
