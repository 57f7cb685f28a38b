//! Batch aggregation: turns per-image predictions into one diagnosis.
//!
//! The winning label is decided by majority vote. Equal vote counts go to the
//! lexicographically smallest label so the outcome never depends on upload
//! order. Confidence is averaged over the images that voted for the winner only.

use std::collections::BTreeMap;

use shared::{DiagnosisResponse, Severity};

use crate::inference::Prediction;

pub const SEVERE_THRESHOLD: f64 = 0.85;
pub const MODERATE_THRESHOLD: f64 = 0.60;

pub const RECOMMENDATIONS: [&str; 3] = [
    "Keep the area clean",
    "Book a vet appointment",
    "Avoid applying unverified home remedies",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiagnosisError {
    #[error("Cannot aggregate an empty batch of predictions")]
    EmptyBatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub label: String,
    /// Mean confidence of the winning label, in [0, 1].
    pub average_confidence: f64,
    /// `average_confidence` as a percentage rounded to two decimals.
    pub confidence_percent: f64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
    pub per_image: Vec<Prediction>,
}

pub fn severity_for(average_confidence: f64) -> Severity {
    if average_confidence >= SEVERE_THRESHOLD {
        Severity::Severe
    } else if average_confidence >= MODERATE_THRESHOLD {
        Severity::Moderate
    } else {
        Severity::Mild
    }
}

pub fn round_percent(average_confidence: f64) -> f64 {
    (average_confidence * 100.0 * 100.0).round() / 100.0
}

/// Label with the most votes; ties resolve to the smallest label.
pub fn majority_label(predictions: &[Prediction]) -> Option<&str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for prediction in predictions {
        *counts.entry(prediction.label.as_str()).or_insert(0) += 1;
    }

    let mut winner: Option<(&str, usize)> = None;
    // BTreeMap iterates in ascending key order, so only a strictly larger count replaces.
    for (label, count) in counts {
        match winner {
            Some((_, best)) if count <= best => {}
            _ => winner = Some((label, count)),
        }
    }
    winner.map(|(label, _)| label)
}

pub fn aggregate(predictions: Vec<Prediction>) -> Result<Diagnosis, DiagnosisError> {
    let label = majority_label(&predictions)
        .ok_or(DiagnosisError::EmptyBatch)?
        .to_string();

    let (sum, votes) = predictions
        .iter()
        .filter(|p| p.label == label)
        .fold((0.0f64, 0usize), |(sum, n), p| (sum + p.confidence as f64, n + 1));
    let average_confidence = if votes > 0 { sum / votes as f64 } else { 0.0 };

    let severity = severity_for(average_confidence);
    let description = format!(
        "Likely {} detected aggregated over {} images.",
        label,
        predictions.len()
    );

    Ok(Diagnosis {
        label,
        average_confidence,
        confidence_percent: round_percent(average_confidence),
        severity,
        description,
        recommendations: RECOMMENDATIONS.iter().map(|r| r.to_string()).collect(),
        per_image: predictions,
    })
}

impl Diagnosis {
    pub fn into_response(self) -> DiagnosisResponse {
        DiagnosisResponse {
            per_image_predictions: self.per_image.iter().map(Prediction::to_wire).collect(),
            disease: self.label,
            confidence: self.confidence_percent,
            severity: self.severity,
            description: self.description,
            recommendations: self.recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(label: &str, confidence: f32) -> Prediction {
        Prediction {
            index: 0,
            label: label.to_string(),
            confidence,
            distribution: vec![confidence, 1.0 - confidence],
        }
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert_eq!(aggregate(Vec::new()), Err(DiagnosisError::EmptyBatch));
    }

    #[test]
    fn unanimous_batch_averages_all_confidences() {
        let diagnosis = aggregate(vec![
            prediction("Fungal_infections", 0.5),
            prediction("Fungal_infections", 0.75),
            prediction("Fungal_infections", 1.0),
        ])
        .unwrap();
        assert_eq!(diagnosis.label, "Fungal_infections");
        assert!((diagnosis.average_confidence - 0.75).abs() < 1e-9);
        assert_eq!(diagnosis.confidence_percent, 75.0);
        assert_eq!(diagnosis.severity, Severity::Moderate);
    }

    #[test]
    fn tied_votes_go_to_smallest_label() {
        let predictions = vec![
            prediction("B", 0.9),
            prediction("A", 0.6),
            prediction("B", 0.9),
            prediction("A", 0.6),
        ];
        assert_eq!(majority_label(&predictions), Some("A"));

        let diagnosis = aggregate(predictions).unwrap();
        assert_eq!(diagnosis.label, "A");
        assert_eq!(diagnosis.confidence_percent, 60.0);
    }

    #[test]
    fn tie_break_is_independent_of_upload_order() {
        let forward = vec![prediction("Healthy", 0.7), prediction("Demodicosis", 0.7)];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(majority_label(&forward), Some("Demodicosis"));
        assert_eq!(majority_label(&reversed), Some("Demodicosis"));
    }

    #[test]
    fn severity_boundaries_are_inclusive_below() {
        assert_eq!(severity_for(0.85), Severity::Severe);
        assert_eq!(severity_for(0.8499), Severity::Moderate);
        assert_eq!(severity_for(0.60), Severity::Moderate);
        assert_eq!(severity_for(0.5999), Severity::Mild);
        assert_eq!(severity_for(1.0), Severity::Severe);
        assert_eq!(severity_for(0.0), Severity::Mild);
    }

    #[test]
    fn mixed_batch_averages_only_the_winner() {
        let diagnosis = aggregate(vec![
            prediction("A", 0.9),
            prediction("A", 0.7),
            prediction("B", 0.95),
        ])
        .unwrap();

        assert_eq!(diagnosis.label, "A");
        assert!((diagnosis.average_confidence - 0.8).abs() < 1e-6);
        assert_eq!(diagnosis.confidence_percent, 80.0);
        assert_eq!(diagnosis.severity, Severity::Moderate);
        assert_eq!(
            diagnosis.description,
            "Likely A detected aggregated over 3 images."
        );
        assert_eq!(diagnosis.per_image.len(), 3);
        assert_eq!(diagnosis.per_image[2].label, "B");
    }

    #[test]
    fn percent_is_rounded_to_two_decimals() {
        assert_eq!(round_percent(0.123456), 12.35);
        assert_eq!(round_percent(0.5), 50.0);
        assert_eq!(round_percent(1.0), 100.0);
        // Halves round away from zero. Python's round() would give 80.12 here.
        assert_eq!(round_percent(0.80125), 80.13);

        let diagnosis = aggregate(vec![prediction("A", 0.876543)]).unwrap();
        assert_eq!(diagnosis.confidence_percent, 87.65);
        assert_eq!(diagnosis.severity, Severity::Severe);
    }

    #[test]
    fn response_carries_fixed_recommendations() {
        let response = aggregate(vec![prediction("A", 0.3)])
            .unwrap()
            .into_response();
        assert_eq!(response.disease, "A");
        assert_eq!(response.severity, Severity::Mild);
        assert_eq!(
            response.recommendations,
            vec![
                "Keep the area clean",
                "Book a vet appointment",
                "Avoid applying unverified home remedies"
            ]
        );
        assert_eq!(response.per_image_predictions.len(), 1);
        assert_eq!(response.per_image_predictions[0].confidence, 0.3);
    }
}
