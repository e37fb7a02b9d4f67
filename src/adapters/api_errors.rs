use crate::domain::error::SettlementError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer. Internal detail never reaches the response body.
pub struct ApiError(pub SettlementError);

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            SettlementError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            SettlementError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            SettlementError::UnauthorizedCallback(_) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized_callback",
                "callback signature rejected".to_string(),
            ),
            SettlementError::UnknownPayment(reference) => (
                StatusCode::NOT_FOUND,
                "unknown_payment",
                format!("no payment matches reference: {reference}"),
            ),
            SettlementError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                "invalid_transition",
                format!("cannot move payment from {from} to {to}"),
            ),
            SettlementError::ProviderUnavailable(msg) => {
                tracing::error!("provider unavailable: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "provider_unavailable",
                    "payment provider unavailable, try again".to_string(),
                )
            }
            SettlementError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            SettlementError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
