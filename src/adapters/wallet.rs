//! Hosted wallet checkout: the client is redirected to the wallet's page,
//! and status notifications come back signed with an HMAC-SHA256 of the body
//! in `x-wallet-signature`.

use {
    super::{provider_http_error, signature},
    crate::config::{ProviderCredentials, Secret},
    crate::domain::{
        error::SettlementError,
        id::{EventId, ExternalTxnId},
        money::MoneyAmount,
        payment::PaymentMethod,
        provider::{
            BoxFuture, CallbackEvent, CanonicalStatus, Checkout, CheckoutData, NormalizedCallback,
            ProviderAdapter,
        },
    },
    reqwest::header::{HeaderMap, HeaderValue},
    serde::Deserialize,
    std::time::Duration,
    uuid::Uuid,
};

pub const PROVIDER: &str = "wallet";

pub struct WalletAdapter {
    api_base: String,
    webhook_secret: Secret,
    client: reqwest::Client,
}

impl WalletAdapter {
    pub fn new(creds: &ProviderCredentials, timeout: Duration) -> Result<Self, SettlementError> {
        let mut headers = HeaderMap::with_capacity(1);
        let key = HeaderValue::from_str(creds.api_key.reveal())
            .map_err(|e| SettlementError::ProviderUnavailable(format!("bad api key: {e}")))?;
        headers.insert("X-Api-Key", key);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::ProviderUnavailable(e.to_string()))?;
        Ok(Self {
            api_base: creds.api_base.trim_end_matches('/').to_string(),
            webhook_secret: creds.webhook_secret.clone(),
            client,
        })
    }

    async fn create_wallet_checkout(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> Result<Checkout, SettlementError> {
        let body = serde_json::json!({
            "amount": amount.to_usd_string(),
            "currency": "USD",
            "merchant_ref": payment_id.to_string(),
        });

        let resp = self
            .client
            .post(format!("{}/v1/checkouts", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: checkout create returned {}",
                resp.status()
            )));
        }

        let checkout: WalletCheckout = resp
            .json()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        Ok(Checkout {
            external_txn_id: Some(ExternalTxnId::new(checkout.checkout_id)?),
            data: CheckoutData::Redirect {
                url: checkout.redirect_url,
            },
        })
    }

    async fn refund_checkout(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> Result<(), SettlementError> {
        let resp = self
            .client
            .post(format!(
                "{}/v1/checkouts/{}/refund",
                self.api_base,
                external_txn_id.as_str()
            ))
            .json(&serde_json::json!({ "amount": amount.to_usd_string() }))
            .send()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: refund returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct WalletCheckout {
    checkout_id: String,
    redirect_url: String,
}

#[derive(Deserialize)]
struct Notification {
    notification_id: String,
    checkout_id: String,
    status: String,
    amount: Option<String>,
    merchant_ref: Option<String>,
}

impl ProviderAdapter for WalletAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wallet
    }

    fn signature_header(&self) -> &'static str {
        "x-wallet-signature"
    }

    fn verify_signature(&self, payload: &[u8], sig: &str) -> bool {
        signature::verify_hex(self.webhook_secret.reveal(), payload, sig)
    }

    fn normalize_callback(&self, payload: &[u8]) -> Result<CallbackEvent, SettlementError> {
        let note: Notification = serde_json::from_slice(payload)?;
        let raw: serde_json::Value = serde_json::from_slice(payload)?;
        let event_id = EventId::new(format!("wal_{}", note.notification_id))?;

        let status = match note.status.as_str() {
            "SUCCESS" => CanonicalStatus::Completed,
            "DECLINED" | "EXPIRED" => CanonicalStatus::Failed,
            other => {
                return Ok(CallbackEvent::Ignored {
                    event_id,
                    event_kind: other.to_string(),
                    raw,
                });
            }
        };

        let amount = note
            .amount
            .as_deref()
            .map(MoneyAmount::from_usd_str)
            .transpose()?;

        Ok(CallbackEvent::Settlement(NormalizedCallback {
            event_id,
            event_kind: note.status.clone(),
            external_txn_id: ExternalTxnId::new(note.checkout_id)?,
            correlation_id: note
                .merchant_ref
                .as_deref()
                .and_then(|r| Uuid::parse_str(r).ok()),
            status,
            amount,
            raw,
        }))
    }

    fn create_checkout(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<Checkout, SettlementError>> {
        Box::pin(async move { self.create_wallet_checkout(payment_id, amount).await })
    }

    fn refund_payment(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<(), SettlementError>> {
        let id = external_txn_id.clone();
        Box::pin(async move { self.refund_checkout(&id, amount).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> WalletAdapter {
        let creds = ProviderCredentials {
            api_base: "https://wallet.example".into(),
            api_key: Secret::new("wk_test"),
            webhook_secret: Secret::new("wallet_hook_secret"),
        };
        WalletAdapter::new(&creds, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn verifies_body_hmac() {
        let a = adapter();
        let body = br#"{"notification_id":"n1"}"#;
        let sig = signature::sign_hex("wallet_hook_secret", body);
        assert!(a.verify_signature(body, &sig));
        assert!(!a.verify_signature(br#"{"notification_id":"n2"}"#, &sig));
    }

    #[test]
    fn normalizes_declined_to_failed() {
        let a = adapter();
        let body = serde_json::json!({
            "notification_id": "n_77",
            "checkout_id": "wc_5",
            "status": "DECLINED",
            "amount": "25.00",
            "merchant_ref": null,
        })
        .to_string();

        let CallbackEvent::Settlement(cb) = a.normalize_callback(body.as_bytes()).unwrap() else {
            panic!("expected settlement event");
        };
        assert_eq!(cb.event_id.as_str(), "wal_n_77");
        assert_eq!(cb.status, CanonicalStatus::Failed);
        assert_eq!(cb.amount.unwrap().cents(), 2500);
    }

    #[test]
    fn pending_notification_is_ignored() {
        let a = adapter();
        let body = serde_json::json!({
            "notification_id": "n_78",
            "checkout_id": "wc_5",
            "status": "AWAITING_FUNDS",
        })
        .to_string();

        let event = a.normalize_callback(body.as_bytes()).unwrap();
        assert!(matches!(
            event,
            CallbackEvent::Ignored { ref event_kind, .. } if event_kind == "AWAITING_FUNDS"
        ));
    }
}
