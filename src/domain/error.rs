use thiserror::Error;

use super::payment::PaymentStatus;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("callback rejected: {0}")]
    UnauthorizedCallback(String),

    #[error("no payment matches reference: {0}")]
    UnknownPayment(String),

    #[error("invalid status transition: {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
