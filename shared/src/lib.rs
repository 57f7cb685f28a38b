use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity tier attached to an aggregated diagnosis.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

/// One uploaded image's prediction as returned to clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImagePrediction {
    pub disease: String,
    /// Probability of `disease`, in [0, 1].
    pub confidence: f32,
    /// Full probability distribution, indexed like the label file.
    pub all: Vec<f32>,
}

/// Response body of `POST /analyze_files`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiagnosisResponse {
    pub disease: String,
    /// Average confidence of the winning label as a percentage, two decimals.
    pub confidence: f64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
    pub per_image_predictions: Vec<ImagePrediction>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub labels: usize,
    pub uptime_seconds: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}
