//! Mapping of relay errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pairlink_core::RelayError;

/// HTTP-facing wrapper: maps the error taxonomy onto status codes with a
/// `{"error": message}` body.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match self.0 {
            RelayError::ConfigurationMissing(_) => StatusCode::BAD_REQUEST,
            RelayError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError(RelayError::ConfigurationMissing("OWNER_NUMBER")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(RelayError::ResourceNotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(RelayError::RandomSourceUnavailable("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError(RelayError::ExternalCollaboratorFailure("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_message() {
        let resp = ApiError(RelayError::ConfigurationMissing("OWNER_NUMBER")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "OWNER_NUMBER not configured");
    }
}
