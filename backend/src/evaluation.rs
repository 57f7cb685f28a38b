//! Test-set evaluation: confusion matrix and per-class precision, recall and F1.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::inference::{Prediction, Predictor};
use crate::labels::LabelSet;

/// Rows are the true class, columns the predicted class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    classes: usize,
    counts: Vec<usize>,
}

impl ConfusionMatrix {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            counts: vec![0; classes * classes],
        }
    }

    pub fn record(&mut self, actual: usize, predicted: usize) {
        if actual < self.classes && predicted < self.classes {
            self.counts[actual * self.classes + predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.classes && predicted < self.classes {
            self.counts[actual * self.classes + predicted]
        } else {
            0
        }
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.classes).map(|i| self.get(i, i)).sum()
    }

    pub fn row(&self, actual: usize) -> &[usize] {
        &self.counts[actual * self.classes..(actual + 1) * self.classes]
    }

    fn column_sum(&self, predicted: usize) -> usize {
        (0..self.classes).map(|row| self.get(row, predicted)).sum()
    }

    fn row_sum(&self, actual: usize) -> usize {
        self.row(actual).iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassReport {
    fn from_matrix(matrix: &ConfusionMatrix, class: usize, label: &str) -> Self {
        let tp = matrix.get(class, class);
        let predicted = matrix.column_sum(class);
        let support = matrix.row_sum(class);

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            label: label.to_string(),
            precision,
            recall,
            f1,
            support,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn mean_over(classes: &[&ClassReport], metric: impl Fn(&ClassReport) -> f64) -> f64 {
    if classes.is_empty() {
        return 0.0;
    }
    classes.iter().map(|&c| metric(c)).sum::<f64>() / classes.len() as f64
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub top2_accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub skipped: usize,
    pub per_class: Vec<ClassReport>,
    pub confusion_matrix: ConfusionMatrix,
}

/// Accumulates predictions against known labels.
pub struct Evaluator {
    labels: LabelSet,
    matrix: ConfusionMatrix,
    top2_hits: usize,
    skipped: usize,
}

impl Evaluator {
    pub fn new(labels: LabelSet) -> Self {
        let matrix = ConfusionMatrix::new(labels.len());
        Self {
            labels,
            matrix,
            top2_hits: 0,
            skipped: 0,
        }
    }

    pub fn record(&mut self, actual: usize, prediction: &Prediction) {
        self.matrix.record(actual, prediction.index);
        if prediction.top_k(2).contains(&actual) {
            self.top2_hits += 1;
        }
    }

    /// Counts an image that could not be evaluated.
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn finish(self) -> EvaluationReport {
        let per_class: Vec<ClassReport> = self
            .labels
            .names()
            .iter()
            .enumerate()
            .map(|(class, label)| ClassReport::from_matrix(&self.matrix, class, label))
            .collect();

        let present: Vec<&ClassReport> = per_class.iter().filter(|c| c.support > 0).collect();
        let macro_precision = mean_over(&present, |c| c.precision);
        let macro_recall = mean_over(&present, |c| c.recall);
        let macro_f1 = mean_over(&present, |c| c.f1);

        let total = self.matrix.total();
        let weighted_f1 = if total == 0 {
            0.0
        } else {
            per_class
                .iter()
                .map(|c| c.f1 * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let correct = self.matrix.correct();

        EvaluationReport {
            total,
            correct,
            accuracy: ratio(correct, total),
            top2_accuracy: ratio(self.top2_hits, total),
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_f1,
            skipped: self.skipped,
            per_class,
            confusion_matrix: self.matrix,
        }
    }
}

impl EvaluationReport {
    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }
}

/// Classifies every image under `<root>/<label>/`. Directories that are not a
/// known label are ignored; images that cannot be read or decoded are skipped.
pub fn evaluate_dir(predictor: &Predictor, root: &Path) -> io::Result<EvaluationReport> {
    let mut evaluator = Evaluator::new(predictor.labels().clone());

    for class_dir in sorted_entries(root, |path| path.is_dir())? {
        let Some(name) = class_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(actual) = predictor.labels().index_of(name) else {
            log::warn!("Skipping {}: not in the label file", class_dir.display());
            continue;
        };

        let images = sorted_entries(&class_dir, |path| path.is_file())?;
        log::info!("Evaluating {} images of {}", images.len(), name);
        for image_path in images {
            let bytes = match fs::read(&image_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Cannot read {}: {}", image_path.display(), e);
                    evaluator.skip();
                    continue;
                }
            };
            match predictor.predict(&bytes) {
                Ok(prediction) => evaluator.record(actual, &prediction),
                Err(e) => {
                    log::warn!("Skipping {}: {}", image_path.display(), e);
                    evaluator.skip();
                }
            }
        }
    }

    Ok(evaluator.finish())
}

fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| keep(path))
        .collect();
    entries.sort();
    Ok(entries)
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|c| c.label.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9}  {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in &self.per_class {
            writeln!(
                f,
                "{:>width$}  {:>9.3}  {:>9.3}  {:>9.3}  {:>9}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9.3}  {:>9.3}  {:>9.3}  {:>9}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.total
        )?;
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>9}  {:>9.3}  {:>9}",
            "weighted avg", "", "", self.weighted_f1, self.total
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "Accuracy: {:.3} ({}/{})  Top-2 accuracy: {:.3}  Skipped: {}",
            self.accuracy, self.correct, self.total, self.top2_accuracy, self.skipped
        )?;
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows = true, columns = predicted):")?;
        for (class, report) in self.per_class.iter().enumerate() {
            let row: Vec<String> = self
                .confusion_matrix
                .row(class)
                .iter()
                .map(|n| format!("{:>5}", n))
                .collect();
            writeln!(f, "{:>width$}  {}", report.label, row.join(""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Preprocessor;
    use crate::inference::predictor::tests::{ScriptedClassifier, png_bytes};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn prediction(labels: &LabelSet, distribution: Vec<f32>) -> Prediction {
        Prediction::from_distribution(labels, distribution).unwrap()
    }

    #[test]
    fn confusion_matrix_ignores_out_of_range() {
        let mut matrix = ConfusionMatrix::new(2);
        matrix.record(0, 0);
        matrix.record(0, 1);
        matrix.record(1, 1);
        matrix.record(5, 0);
        assert_eq!(matrix.total(), 3);
        assert_eq!(matrix.correct(), 2);
        assert_eq!(matrix.row(0), &[1, 1]);
        assert_eq!(matrix.get(7, 7), 0);
    }

    #[test]
    fn per_class_metrics() {
        let labels = LabelSet::from_names(["A", "B", "C"]);
        let mut evaluator = Evaluator::new(labels.clone());

        // A: 2 right, 1 predicted as B. B: 1 right. C: never seen, predicted once for B.
        evaluator.record(0, &prediction(&labels, vec![0.8, 0.1, 0.1]));
        evaluator.record(0, &prediction(&labels, vec![0.7, 0.2, 0.1]));
        evaluator.record(0, &prediction(&labels, vec![0.3, 0.6, 0.1]));
        evaluator.record(1, &prediction(&labels, vec![0.1, 0.8, 0.1]));
        evaluator.record(1, &prediction(&labels, vec![0.1, 0.2, 0.7]));
        evaluator.skip();

        let report = evaluator.finish();
        assert_eq!(report.total, 5);
        assert_eq!(report.correct, 3);
        assert_eq!(report.skipped, 1);
        assert!((report.accuracy - 0.6).abs() < 1e-9);
        // Both misses still rank the true label second.
        assert!((report.top2_accuracy - 1.0).abs() < 1e-9);

        let a = &report.per_class[0];
        assert!((a.precision - 1.0).abs() < 1e-9);
        assert!((a.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((a.f1 - 0.8).abs() < 1e-9);
        assert_eq!(a.support, 3);

        let b = &report.per_class[1];
        assert!((b.precision - 0.5).abs() < 1e-9);
        assert!((b.recall - 0.5).abs() < 1e-9);
        assert_eq!(b.support, 2);

        let c = &report.per_class[2];
        assert_eq!(c.precision, 0.0);
        assert_eq!(c.recall, 0.0);
        assert_eq!(c.f1, 0.0);
        assert_eq!(c.support, 0);

        // Macro averages only cover classes that occur in the test set.
        assert!((report.macro_precision - 0.75).abs() < 1e-9);
        assert!((report.macro_recall - (2.0 / 3.0 + 0.5) / 2.0).abs() < 1e-9);
        assert!((report.weighted_f1 - (0.8 * 3.0 + 0.5 * 2.0) / 5.0).abs() < 1e-9);

        let rendered = report.to_string();
        assert!(rendered.contains("precision"));
        assert!(rendered.contains("Confusion matrix"));
    }

    #[test]
    fn empty_evaluation_is_all_zero() {
        let report = Evaluator::new(LabelSet::from_names(["A"])).finish();
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.macro_f1, 0.0);
        assert_eq!(report.weighted_f1, 0.0);
    }

    #[test]
    fn evaluate_dir_walks_known_label_directories() {
        let root = tempdir().unwrap();
        let known = root.path().join("A");
        let unknown = root.path().join("Not_a_label");
        fs::create_dir(&known).unwrap();
        fs::create_dir(&unknown).unwrap();
        fs::write(known.join("a1.png"), png_bytes(16, 16)).unwrap();
        fs::write(known.join("a2.png"), png_bytes(24, 12)).unwrap();
        fs::write(known.join("a3.jpg"), b"truncated upload").unwrap();
        fs::write(unknown.join("x.png"), png_bytes(8, 8)).unwrap();
        fs::write(root.path().join("stray.txt"), b"not a class").unwrap();

        // Only the two decodable images under A reach the classifier.
        let predictor = Predictor::new(
            Preprocessor::default(),
            Arc::new(ScriptedClassifier::new(vec![vec![0.9, 0.1], vec![0.2, 0.8]])),
            Arc::new(LabelSet::from_names(["A", "B"])),
        );

        let report = evaluate_dir(&predictor, root.path()).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.correct, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.confusion_matrix.row(0), &[1, 1]);
        assert_eq!(report.per_class[0].support, 2);
        assert_eq!(report.per_class[1].support, 0);

        let json_path = root.path().join("report.json");
        report.write_json(&json_path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(written["total"], 2);
        assert_eq!(written["skipped"], 1);
        assert_eq!(written["per_class"][0]["label"], "A");
    }

    #[test]
    fn evaluate_dir_requires_existing_root() {
        let root = tempdir().unwrap();
        let predictor = Predictor::new(
            Preprocessor::default(),
            Arc::new(ScriptedClassifier::new(vec![])),
            Arc::new(LabelSet::from_names(["A"])),
        );
        assert!(evaluate_dir(&predictor, &root.path().join("missing")).is_err());
    }
}
