use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use propline_models::{ErrorClass, PropError};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// HTTP face of [`PropError`]. Client-class failures are 400s; a missing
/// model or an unreachable store is 503 since a retry may succeed.
#[derive(Debug)]
pub enum ApiError {
    Domain(PropError),
    Payload(JsonRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Payload(_) => StatusCode::BAD_REQUEST,
            Self::Domain(e) => match (e.class(), e) {
                (ErrorClass::Client, _) => StatusCode::BAD_REQUEST,
                (_, PropError::ModelNotFound { .. } | PropError::UpstreamUnavailable(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Domain(e) => ErrorBody {
                error: e.to_string(),
                kind: e.kind().to_string(),
            },
            Self::Payload(rejection) => ErrorBody {
                error: rejection.body_text(),
                kind: "invalid_request".to_string(),
            },
        }
    }
}

impl From<PropError> for ApiError {
    fn from(e: PropError) -> Self {
        Self::Domain(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Payload(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                kind = %body.kind,
                error = %body.error,
                "Request failed"
            );
        }
        (status, Json(body)).into_response()
    }
}
