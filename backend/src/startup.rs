use std::path::Path;
use std::sync::Arc;

use crate::config::{ConfigError, InferenceConfig};
use crate::inference::{Classifier, InferenceError, Predictor, Preprocessor};
use crate::labels::{LabelError, LabelSet};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<StartupError> for std::io::Error {
    fn from(err: StartupError) -> Self {
        std::io::Error::other(err.to_string())
    }
}

/// Loads the label file, wraps `classifier`, and checks the two agree on width.
pub fn build_predictor(
    classifier: Arc<dyn Classifier>,
    labels_path: &Path,
    config: &InferenceConfig,
) -> Result<Predictor, StartupError> {
    let labels = LabelSet::load(labels_path)?;
    log::info!(
        "Loaded {} labels from {}",
        labels.len(),
        labels_path.display()
    );

    let predictor = Predictor::new(
        Preprocessor::from_config(config)?,
        classifier,
        Arc::new(labels),
    );
    let width = predictor.verify_output_width()?;
    log::info!("Classifier output width {} matches label file", width);
    Ok(predictor)
}

#[cfg(feature = "torch")]
pub fn load_predictor(
    model_path: &Path,
    labels_path: &Path,
    config: &InferenceConfig,
) -> Result<Predictor, StartupError> {
    let classifier = crate::inference::TorchClassifier::load(
        model_path,
        config.device()?,
        config.model.apply_softmax,
    )?;
    log::info!("Classifier running on {:?}", classifier.device());
    build_predictor(Arc::new(classifier), labels_path, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::predictor::tests::ScriptedClassifier;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn label_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn builds_when_widths_agree() {
        let labels = label_file(&["A", "", "B"]);
        let predictor = build_predictor(
            Arc::new(ScriptedClassifier::new(vec![vec![0.4, 0.6]])),
            labels.path(),
            &InferenceConfig::default(),
        )
        .unwrap();
        assert_eq!(predictor.labels().len(), 2);
    }

    #[test]
    fn width_mismatch_is_fatal() {
        let labels = label_file(&["A", "B", "C"]);
        let err = build_predictor(
            Arc::new(ScriptedClassifier::new(vec![vec![0.4, 0.6]])),
            labels.path(),
            &InferenceConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StartupError::Inference(InferenceError::LabelMismatch { .. })
        ));
    }

    #[test]
    fn empty_label_file_is_fatal() {
        let labels = label_file(&["", "  "]);
        let err = build_predictor(
            Arc::new(ScriptedClassifier::new(vec![vec![1.0]])),
            labels.path(),
            &InferenceConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StartupError::Labels(LabelError::Empty(_))));
    }
}
