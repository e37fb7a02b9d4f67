use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::SettlementError;

const MAX_REF_LEN: usize = 255;

/// Transaction reference assigned by a payment provider (invoice id,
/// session id, checkout id). Opaque to us beyond basic sanity checks.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalTxnId(String);

impl ExternalTxnId {
    pub fn new(id: impl Into<String>) -> Result<Self, SettlementError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_REF_LEN || id.chars().any(char::is_whitespace) {
            return Err(SettlementError::InvalidRequest(format!(
                "malformed external transaction id: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Identifier of one webhook delivery. Providers retry deliveries with the
/// same event id, which is what makes it usable as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, SettlementError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_REF_LEN || id.chars().any(char::is_whitespace) {
            return Err(SettlementError::InvalidRequest(format!(
                "malformed event id: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(ExternalTxnId::new("").is_err());
        assert!(ExternalTxnId::new("has space").is_err());
        assert!(EventId::new("\t").is_err());
        assert!(ExternalTxnId::new("inv_12345").is_ok());
    }

    #[test]
    fn rejects_oversized() {
        let long = "x".repeat(MAX_REF_LEN + 1);
        assert!(ExternalTxnId::new(long.clone()).is_err());
        assert!(EventId::new(long).is_err());
    }
}
