//! Error handling

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use price_core::{ErrorClass, PipelineError};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Client errors
    ValidationError(String),
    InvalidOption {
        message: String,
        valid_options: Vec<String>,
    },
    SchemaError {
        status: StatusCode,
        message: String,
    },

    // Deployment / configuration errors; detail is logged, not returned
    InternalError(String),

    // Anything unclassified; detail is returned
    PredictionFailed(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, valid_options) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::InvalidOption { message, valid_options } => {
                (StatusCode::BAD_REQUEST, message, Some(valid_options))
            }
            AppError::SchemaError { status, message } => (status, message, None),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::PredictionFailed(msg) => {
                tracing::error!("Prediction failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Prediction failed: {}", msg),
                    None,
                )
            }
        };

        let kind = if status.is_client_error() {
            "client_error"
        } else {
            "server_error"
        };

        let mut body = json!({
            "kind": kind,
            "error": error_message,
            "status": status.as_u16()
        });
        if let Some(options) = valid_options {
            body["valid_options"] = json!(options);
        }

        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err.class() {
            ErrorClass::Client => match err.valid_options() {
                Some(options) => AppError::InvalidOption {
                    valid_options: options.to_vec(),
                    message: err.to_string(),
                },
                None => AppError::ValidationError(err.to_string()),
            },
            ErrorClass::Server => AppError::InternalError(err.to_string()),
            ErrorClass::Unclassified => AppError::PredictionFailed(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match &rejection {
            JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            other => other.status(),
        };
        AppError::SchemaError {
            status,
            message: rejection.body_text(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::PredictionFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_error_with_options() {
        let err = PipelineError::UnknownCategory {
            field: "Furnished".to_string(),
            value: "Partly".to_string(),
            options: vec!["No".to_string(), "Yes".to_string()],
        };
        let (status, body) = body_json(err.into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "client_error");
        assert_eq!(body["status"], 400);
        assert_eq!(body["error"], "Invalid Furnished: 'Partly'. Valid options: No, Yes");
        assert_eq!(body["valid_options"], json!(["No", "Yes"]));
    }

    #[tokio::test]
    async fn test_server_error_hides_detail() {
        let (status, body) = body_json(PipelineError::MissingEncoder("City".to_string()).into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "server_error");
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("valid_options").is_none());
    }

    #[tokio::test]
    async fn test_unclassified_error_keeps_message() {
        let err = PipelineError::Model(price_core::model::ModelError::Evaluation("boom".to_string()));
        let (status, body) = body_json(err.into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Prediction failed: Model evaluation failed: boom");
    }
}
