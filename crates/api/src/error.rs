//! API error types

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subhook_billing::{BillingError, IngestError, StoreError, VerificationError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Webhook rejected: {0}")]
    Webhook(#[from] VerificationError),

    #[error("Event store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Billing provider error: {0}")]
    Billing(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Webhook(e) => (StatusCode::BAD_REQUEST, e.code().to_string()),
            ApiError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable".to_string(),
            ),
            ApiError::Billing(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::StripeApi(msg) => ApiError::Billing(msg),
            BillingError::InvalidInput(msg) => ApiError::Validation(msg),
            BillingError::Config(msg) => ApiError::ServiceUnavailable(msg),
            BillingError::Database(msg) | BillingError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Verification(e) => ApiError::Webhook(e),
            IngestError::Store(StoreError::Unavailable(msg)) => ApiError::StoreUnavailable(msg),
            IngestError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                ApiError::Webhook(VerificationError::StaleTimestamp),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::StoreUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::Billing("card declined".into()), StatusCode::FORBIDDEN),
            (
                ApiError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_billing_error_mapping() {
        assert!(matches!(
            ApiError::from(BillingError::StripeApi("No such customer".into())),
            ApiError::Billing(_)
        ));
        assert!(matches!(
            ApiError::from(BillingError::InvalidInput("bad id".into())),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(BillingError::Database("timeout".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_ingest_error_mapping() {
        assert!(matches!(
            ApiError::from(IngestError::Verification(VerificationError::BadSignature)),
            ApiError::Webhook(VerificationError::BadSignature)
        ));
        assert!(matches!(
            ApiError::from(IngestError::Store(StoreError::Unavailable("pool".into()))),
            ApiError::StoreUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from(IngestError::Store(StoreError::Corrupt("outcome".into()))),
            ApiError::Internal(_)
        ));
    }
}
