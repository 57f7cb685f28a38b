use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::diagnosis::DiagnosisError;
use crate::inference::{InferenceError, PreprocessError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No files uploaded")]
    NoFiles,
    #[error("File '{file}' (#{position}) is not a valid image: {source}")]
    InvalidImage {
        file: String,
        position: usize,
        #[source]
        source: PreprocessError,
    },
    #[error("File '{file}' is {size} bytes, max allowed is {limit} bytes")]
    FileTooLarge {
        file: String,
        size: usize,
        limit: usize,
    },
    #[error("Too many files: at most {limit} per request")]
    TooManyFiles { limit: usize },
    #[error("Malformed multipart request: {0}")]
    Multipart(String),
    #[error("Model inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("{0}")]
    Diagnosis(#[from] DiagnosisError),
    #[error("Inference worker failed: {0}")]
    Worker(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoFiles
            | ApiError::InvalidImage { .. }
            | ApiError::Multipart(_)
            | ApiError::Diagnosis(_) => StatusCode::BAD_REQUEST,
            ApiError::FileTooLarge { .. } | ApiError::TooManyFiles { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Inference(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(ApiError::NoFiles.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::FileTooLarge {
                file: "a.jpg".into(),
                size: 10,
                limit: 5
            }
            .status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Diagnosis(DiagnosisError::EmptyBatch).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn server_errors_map_to_500() {
        let err = ApiError::from(InferenceError::LabelMismatch {
            expected: 6,
            actual: 5,
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Model inference error: Model produced 5 outputs but 6 labels are loaded"
        );
    }
}
