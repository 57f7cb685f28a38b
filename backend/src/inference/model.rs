use ndarray::Array4;

use super::preprocess::PreprocessError;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Preprocessing failed: {0}")]
    Preprocessing(#[from] PreprocessError),
    #[cfg(feature = "torch")]
    #[error("Model error: {0}")]
    Model(#[from] tch::TchError),
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
    #[error("Model produced {actual} outputs but {expected} labels are loaded")]
    LabelMismatch { expected: usize, actual: usize },
    #[error("Model produced an empty output")]
    EmptyOutput,
    #[error("Input tensor is not contiguous")]
    NonContiguousInput,
    #[error("Model lock poisoned")]
    Poisoned,
}

/// The trained classifier: maps a normalized `(1, H, W, 3)` tensor to one
/// probability per label.
pub trait Classifier: Send + Sync {
    fn classify(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use ndarray::Array4;
    use tch::{CModule, Device, Kind, Tensor};

    use super::{Classifier, InferenceError};
    use crate::config::DevicePreference;

    /// TorchScript export of the trained network, loaded once and shared.
    #[derive(Clone)]
    pub struct TorchClassifier {
        model: Arc<Mutex<CModule>>,
        device: Device,
        apply_softmax: bool,
    }

    impl TorchClassifier {
        pub fn load(
            model_path: &Path,
            preference: DevicePreference,
            apply_softmax: bool,
        ) -> Result<Self, InferenceError> {
            if !model_path.is_file() {
                return Err(InferenceError::ModelLoad(format!(
                    "model file not found: {}",
                    model_path.display()
                )));
            }
            let device = match preference {
                DevicePreference::Auto => Device::cuda_if_available(),
                DevicePreference::Cpu => Device::Cpu,
                DevicePreference::Cuda => Device::Cuda(0),
            };
            let mut module = CModule::load_on_device(model_path, device).map_err(|e| {
                InferenceError::ModelLoad(format!("{}: {}", model_path.display(), e))
            })?;
            module.set_eval();
            log::info!(
                "Loaded model {} (softmax on output: {})",
                model_path.display(),
                apply_softmax
            );
            Ok(Self {
                model: Arc::new(Mutex::new(module)),
                device,
                apply_softmax,
            })
        }

        pub fn device(&self) -> Device {
            self.device
        }
    }

    impl Classifier for TorchClassifier {
        fn classify(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
            let data = input
                .as_slice()
                .ok_or(InferenceError::NonContiguousInput)?;
            let tensor = Tensor::from_slice(data)
                .view(shape.as_slice())
                .to_device(self.device);

            let output = tch::no_grad(|| {
                let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
                model
                    .forward_ts(&[tensor])
                    .map_err(InferenceError::Model)
            })?;

            let output = if self.apply_softmax {
                output.softmax(-1, Kind::Float)
            } else {
                output.to_kind(Kind::Float)
            };
            let output_flat = output.to_device(Device::Cpu).view([-1]);
            let output_vec = Vec::<f32>::try_from(&output_flat)?;
            if output_vec.is_empty() {
                return Err(InferenceError::EmptyOutput);
            }
            Ok(output_vec)
        }
    }
}
