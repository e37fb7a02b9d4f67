pub mod api_errors;
pub mod card;
pub mod crypto_pay;
pub mod http;
pub mod signature;
pub mod wallet;

use crate::domain::error::SettlementError;

/// Map outbound HTTP failures onto the retryable provider error. Timeouts
/// and connection failures must never be read as success.
pub(crate) fn provider_http_error(provider: &str, e: reqwest::Error) -> SettlementError {
    if e.is_timeout() {
        SettlementError::ProviderUnavailable(format!("{provider}: request timed out"))
    } else {
        SettlementError::ProviderUnavailable(format!("{provider}: {e}"))
    }
}
