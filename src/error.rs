use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务不存在")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Transcription has no segments")]
    EmptyTranscription,

    #[error("Vocal separation failed: {0}")]
    SeparationFailed(String),

    #[error("Audio slicing failed: {0}")]
    SlicingFailed(String),

    #[error("Speech synthesis failed for sentence {0}: {1}")]
    SynthesisFailed(i32, String),

    #[error("Text simplification failed: {0}")]
    SimplificationFailed(String),

    #[error("Time-stretch factor {0} outside [0.5, 100]")]
    StretchOutOfRange(f64),

    #[error("Video cut failed: {0}")]
    VideoCutFailed(String),

    #[error("Mux failed: {0}")]
    MuxFailed(String),

    #[error("HLS segmenter failed: {0}")]
    SegmenterFailed(String),

    #[error("Object store upload failed: {0}")]
    UploadFailed(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("External process timed out: {0}")]
    Timeout(String),

    #[error("External process failed: {0}")]
    ExternalProcess(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "任务不存在".to_string()),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::StoreUnavailable(ref msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::ObjectStore(ref msg) => {
                tracing::error!("Object store error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Object store error".to_string())
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
