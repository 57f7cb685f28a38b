pub mod model;
pub mod predictor;
pub mod preprocess;

pub use model::{Classifier, InferenceError};
pub use predictor::{Prediction, Predictor};
pub use preprocess::{PreprocessError, Preprocessor};

#[cfg(feature = "torch")]
pub use model::TorchClassifier;
