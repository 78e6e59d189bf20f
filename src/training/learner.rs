use burn::{
    backend::NdArray,
    prelude::*,
    tensor::{Int, Transaction},
    train::metric::{AccuracyInput, Adaptor, ItemLazy, LossInput},
};
use derive_new::new;

use super::metrics::SegmentationIoUInput;

/// Everything one train/valid step produces: the combined loss plus the
/// output/target pairs the metrics consume.
#[derive(new)]
pub struct MultiTaskOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub class_output: Tensor<B, 2>,
    pub class_targets: Tensor<B, 1, Int>,
    pub seg_output: Tensor<B, 4>,
    pub seg_targets: Tensor<B, 4, Int>,
}

impl<B: Backend> ItemLazy for MultiTaskOutput<B> {
    type ItemSync = MultiTaskOutput<NdArray>;

    fn sync(self) -> Self::ItemSync {
        let [loss, class_output, class_targets, seg_output, seg_targets] = Transaction::default()
            .register(self.loss)
            .register(self.class_output)
            .register(self.class_targets)
            .register(self.seg_output)
            .register(self.seg_targets)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        let device = &Default::default();

        MultiTaskOutput {
            loss: Tensor::from_data(loss, device),
            class_output: Tensor::from_data(class_output, device),
            class_targets: Tensor::from_data(class_targets, device),
            seg_output: Tensor::from_data(seg_output, device),
            seg_targets: Tensor::from_data(seg_targets, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for MultiTaskOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<AccuracyInput<B>> for MultiTaskOutput<B> {
    fn adapt(&self) -> AccuracyInput<B> {
        AccuracyInput::new(self.class_output.clone(), self.class_targets.clone())
    }
}

impl<B: Backend> Adaptor<SegmentationIoUInput<B>> for MultiTaskOutput<B> {
    fn adapt(&self) -> SegmentationIoUInput<B> {
        SegmentationIoUInput::new(self.seg_output.clone(), self.seg_targets.clone())
    }
}
