use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error envelope: `{"status":"error","message":...,"errors":[...]}`. The
/// shape is a stable client contract; storage internals never appear here.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    Validation { message: String, errors: Vec<String> },
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    /// Flatten `validator` errors into the envelope's per-field list.
    pub(crate) fn validation(errors: validator::ValidationErrors) -> Self {
        let details: Vec<String> = errors
            .to_string()
            .split('\n')
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        Self::Validation { message: "Validation failed".to_string(), errors: details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response = (
                    status,
                    Json(ErrorResponse {
                        status: "error",
                        message: message.to_string(),
                        errors: None,
                    }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string(), None),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::Validation { message, errors } => {
                (StatusCode::BAD_REQUEST, message, Some(errors))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message, None),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        };

        (status, Json(ErrorResponse { status: "error", message, errors })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn envelope_is_stable() {
        let (status, body) = body_json(ApiError::NotFound("Exam not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Exam not found");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let (status, _) = body_json(ApiError::Conflict("Attempt already submitted".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn validation_carries_field_errors() {
        let (status, body) = body_json(ApiError::Validation {
            message: "Validation failed".to_string(),
            errors: vec!["score: must be non-negative".to_string()],
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0], "score: must be non-negative");
    }

    #[tokio::test]
    async fn unauthorized_sets_www_authenticate() {
        let response = ApiError::Unauthorized("Invalid authentication credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    }
}
