use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::inference::InferenceError;
use crate::inference::upload::UploadError;

/// Errors surfaced by the prediction endpoints, each with a fixed status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Only POST method is allowed")]
    MethodNotAllowed,
    #[error("No file provided")]
    MissingInput,
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),
    #[error("File exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: usize },
    #[error("Model '{0}' is not loaded")]
    ModelUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(#[from] InferenceError),
    #[error("Worker pool error: {0}")]
    Blocking(String),
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MissingFile => ApiError::MissingInput,
            UploadError::TooLarge { limit } => ApiError::PayloadTooLarge { limit },
            UploadError::Multipart(msg) => ApiError::MalformedUpload(msg),
            UploadError::Storage(e) => ApiError::Internal(InferenceError::Storage(e.to_string())),
        }
    }
}

impl ApiError {
    /// Message shown to the client. Internal causes stay in the logs.
    fn client_message(&self) -> String {
        match self {
            ApiError::Internal(InferenceError::Decode(_)) => {
                "Uploaded file could not be decoded as an image".to_string()
            }
            ApiError::Internal(_) | ApiError::Blocking(_) => {
                "Prediction failed due to an internal error".to_string()
            }
            ApiError::MalformedUpload(_) => "Malformed multipart upload".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MissingInput | ApiError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.client_message()))
    }
}
