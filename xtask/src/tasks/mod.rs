pub mod convert;
pub mod eval;
pub mod run;
pub mod train;
pub mod visualize;

/// CPU backend by default; WGPU when the `wgpu` feature is enabled.
#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu<f32, i32>;
#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray<f32>;

pub type TrainingBackend = burn::backend::Autodiff<InferenceBackend>;
