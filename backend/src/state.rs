use chrono::{DateTime, Utc};

use crate::config::InferenceConfig;
use crate::inference::Predictor;

/// Everything a request handler reads. Built once at startup and never mutated.
pub struct AppState {
    pub predictor: Predictor,
    pub config: InferenceConfig,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(predictor: Predictor, config: InferenceConfig) -> Self {
        Self {
            predictor,
            config,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
