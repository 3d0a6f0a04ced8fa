//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use cadence_core::signing::SignatureRejection;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed request parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Approval link timestamp fell outside the accepted window.
    #[error("link expired")]
    Expired,

    /// Signature did not match the request.
    #[error("invalid signature")]
    InvalidSignature,

    /// Post was actioned too recently.
    #[error("cooling down")]
    CoolingDown,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SignatureRejection> for ApiError {
    fn from(rejection: SignatureRejection) -> Self {
        match rejection {
            SignatureRejection::Expired => Self::Expired,
            SignatureRejection::InvalidSignature => Self::InvalidSignature,
        }
    }
}

impl From<cadence_core::Error> for ApiError {
    fn from(err: cadence_core::Error) -> Self {
        use cadence_core::Error;
        match err {
            Error::NotFound(msg) => Self::NotFound(msg),
            // State conflicts surface as descriptive bad requests so the
            // approver sees why the click did nothing
            Error::Conflict(msg) => Self::BadRequest(msg),
            Error::InvalidTransition { from, to } => {
                Self::BadRequest(format!("cannot move a {from} post to {to}"))
            }
            Error::Validation(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.into()),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone())),
            Self::Expired => (StatusCode::UNAUTHORIZED, "expired", None),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature", None),
            Self::CoolingDown => (
                StatusCode::TOO_MANY_REQUESTS,
                "cooling_down",
                Some("This post was actioned moments ago".to_string()),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("An internal error occurred".to_string()),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Expired, StatusCode::UNAUTHORIZED),
            (ApiError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (ApiError::CoolingDown, StatusCode::TOO_MANY_REQUESTS),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_conflict_maps_to_bad_request() {
        let err: ApiError = cadence_core::Error::Conflict("already approved".into()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_signature_rejection_mapping() {
        assert!(matches!(
            ApiError::from(SignatureRejection::Expired),
            ApiError::Expired
        ));
        assert!(matches!(
            ApiError::from(SignatureRejection::InvalidSignature),
            ApiError::InvalidSignature
        ));
    }
}
