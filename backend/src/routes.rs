use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use shared::HealthResponse;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::diagnosis::aggregate;
use crate::error::ApiError;
use crate::inference::{InferenceError, Prediction, Predictor};
use crate::state::AppState;

/// One uploaded file, fully buffered.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/analyze_files").route(web::post().to(analyze_files)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn analyze_files(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let uploads = read_uploads(&mut payload, &state.config.upload).await?;

    if uploads.is_empty() {
        warn!("[{}] Rejected request without files", request_id);
        return Err(ApiError::NoFiles);
    }
    info!("[{}] Analyzing {} file(s)", request_id, uploads.len());

    let predictor = state.predictor.clone();
    let predictions = web::block(move || predict_batch(&predictor, &uploads))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?
        .inspect_err(|e| error!("[{}] {}", request_id, e))?;

    for (position, prediction) in predictions.iter().enumerate() {
        debug!(
            "[{}] #{} -> {} ({:.4})",
            request_id,
            position + 1,
            prediction.label,
            prediction.confidence
        );
    }

    let diagnosis = aggregate(predictions)?;
    info!(
        "[{}] Diagnosis: {} at {:.2}% ({})",
        request_id, diagnosis.label, diagnosis.confidence_percent, diagnosis.severity
    );

    Ok(HttpResponse::Ok().json(diagnosis.into_response()))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        labels: state.predictor.labels().len(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Buffers every part that carries a filename. Other form fields are skipped.
/// `max_file_bytes` applies to each file and `max_files` to the request.
pub async fn read_uploads(
    payload: &mut Multipart,
    limits: &UploadConfig,
) -> Result<Vec<Upload>, ApiError> {
    let max_file_bytes = limits.max_file_bytes;
    let mut uploads = Vec::new();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        let filename = match field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
        {
            Some(name) => name.to_string(),
            None => continue,
        };
        if let Some(limit) = limits.max_files.filter(|&limit| uploads.len() >= limit) {
            return Err(ApiError::TooManyFiles { limit });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
            if bytes.len() + data.len() > max_file_bytes {
                return Err(ApiError::FileTooLarge {
                    file: filename,
                    size: bytes.len() + data.len(),
                    limit: max_file_bytes,
                });
            }
            bytes.extend_from_slice(&data);
        }
        uploads.push(Upload { filename, bytes });
    }

    Ok(uploads)
}

/// Classifies uploads in order. The first undecodable file rejects the batch.
pub fn predict_batch(predictor: &Predictor, uploads: &[Upload]) -> Result<Vec<Prediction>, ApiError> {
    uploads
        .iter()
        .enumerate()
        .map(|(index, upload)| {
            predictor.predict(&upload.bytes).map_err(|e| match e {
                InferenceError::Preprocessing(source) => ApiError::InvalidImage {
                    file: upload.filename.clone(),
                    position: index + 1,
                    source,
                },
                other => ApiError::Inference(other),
            })
        })
        .collect()
}
