//! Crypto Pay-style processor: invoices created over REST, callbacks signed
//! with an HMAC-SHA256 of the raw body in `crypto-pay-api-signature`.

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

pub const PROVIDER: &str = "crypto_pay";

pub struct CryptoPayAdapter {
    api_base: String,
    webhook_secret: Secret,
    client: reqwest::Client,
}

impl CryptoPayAdapter {
    pub fn new(creds: &ProviderCredentials, timeout: Duration) -> Result<Self, SettlementError> {
        let mut headers = HeaderMap::with_capacity(1);
        let token = HeaderValue::from_str(creds.api_key.reveal())
            .map_err(|e| SettlementError::ProviderUnavailable(format!("bad api key: {e}")))?;
        headers.insert("Crypto-Pay-API-Token", token);
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

    async fn create_invoice(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> Result<Checkout, SettlementError> {
        let body = serde_json::json!({
            "currency_type": "fiat",
            "fiat": "USD",
            "amount": amount.to_usd_string(),
            "payload": payment_id.to_string(),
        });

        let resp = self
            .client
            .post(format!("{}/api/createInvoice", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: createInvoice returned {}",
                resp.status()
            )));
        }

        let invoice: ApiResponse<Invoice> = resp
            .json()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;
        if !invoice.ok {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: createInvoice rejected"
            )));
        }
        let invoice = invoice.result;

        Ok(Checkout {
            external_txn_id: Some(ExternalTxnId::new(invoice.invoice_id.to_string())?),
            data: CheckoutData::Invoice {
                invoice_url: invoice.bot_invoice_url,
            },
        })
    }

    async fn refund_invoice(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> Result<(), SettlementError> {
        let body = serde_json::json!({
            "invoice_id": external_txn_id.as_str(),
            "amount": amount.to_usd_string(),
        });

        let resp = self
            .client
            .post(format!("{}/api/refund", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: refund returned {}",
                resp.status()
            )));
        }

        let outcome: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;
        if !outcome.ok {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: refund rejected"
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: T,
}

#[derive(Deserialize)]
struct Invoice {
    invoice_id: i64,
    bot_invoice_url: String,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    update_type: String,
    payload: InvoicePayload,
}

#[derive(Deserialize)]
struct InvoicePayload {
    invoice_id: i64,
    status: String,
    amount: String,
    /// Merchant payload echoed back, the payment id we embedded.
    payload: Option<String>,
}

impl ProviderAdapter for CryptoPayAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::CryptoPay
    }

    fn signature_header(&self) -> &'static str {
        "crypto-pay-api-signature"
    }

    fn verify_signature(&self, payload: &[u8], sig: &str) -> bool {
        signature::verify_hex(self.webhook_secret.reveal(), payload, sig)
    }

    fn normalize_callback(&self, payload: &[u8]) -> Result<CallbackEvent, SettlementError> {
        let update: Update = serde_json::from_slice(payload)?;
        let raw: serde_json::Value = serde_json::from_slice(payload)?;
        // Event ids are provider-scoped; prefix them so they cannot collide
        // with other providers in the shared dedup table.
        let event_id = EventId::new(format!("cp_{}", update.update_id))?;

        if update.update_type != "invoice_paid" {
            return Ok(CallbackEvent::Ignored {
                event_id,
                event_kind: update.update_type,
                raw,
            });
        }

        let status = match update.payload.status.as_str() {
            "paid" => CanonicalStatus::Completed,
            "expired" => CanonicalStatus::Failed,
            other => {
                return Ok(CallbackEvent::Ignored {
                    event_id,
                    event_kind: format!("invoice_{other}"),
                    raw,
                });
            }
        };

        Ok(CallbackEvent::Settlement(NormalizedCallback {
            event_id,
            event_kind: format!("invoice_{}", update.payload.status),
            external_txn_id: ExternalTxnId::new(update.payload.invoice_id.to_string())?,
            correlation_id: update
                .payload
                .payload
                .as_deref()
                .and_then(|p| Uuid::parse_str(p).ok()),
            status,
            amount: Some(MoneyAmount::from_usd_str(&update.payload.amount)?),
            raw,
        }))
    }

    fn create_checkout(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<Checkout, SettlementError>> {
        Box::pin(async move { self.create_invoice(payment_id, amount).await })
    }

    fn refund_payment(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<(), SettlementError>> {
        let id = external_txn_id.clone();
        Box::pin(async move { self.refund_invoice(&id, amount).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> CryptoPayAdapter {
        let creds = ProviderCredentials {
            api_base: "https://pay.crypt.example".into(),
            api_key: Secret::new("cp_key"),
            webhook_secret: Secret::new("cp_webhook_secret"),
        };
        CryptoPayAdapter::new(&creds, Duration::from_secs(10)).unwrap()
    }

    fn paid_body(payment_id: Uuid) -> Vec<u8> {
        serde_json::json!({
            "update_id": 9177,
            "update_type": "invoice_paid",
            "payload": {
                "invoice_id": 528,
                "status": "paid",
                "amount": "150.00",
                "payload": payment_id.to_string(),
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn verifies_own_signature() {
        let a = adapter();
        let body = paid_body(Uuid::now_v7());
        let sig = signature::sign_hex("cp_webhook_secret", &body);
        assert!(a.verify_signature(&body, &sig));
        assert!(!a.verify_signature(&body, &signature::sign_hex("wrong", &body)));
    }

    #[test]
    fn normalizes_paid_invoice() {
        let a = adapter();
        let payment_id = Uuid::now_v7();
        let event = a.normalize_callback(&paid_body(payment_id)).unwrap();
        let CallbackEvent::Settlement(cb) = event else {
            panic!("expected settlement event");
        };
        assert_eq!(cb.event_id.as_str(), "cp_9177");
        assert_eq!(cb.external_txn_id.as_str(), "528");
        assert_eq!(cb.correlation_id, Some(payment_id));
        assert_eq!(cb.status, CanonicalStatus::Completed);
        assert_eq!(cb.amount.unwrap().cents(), 15000);
    }

    #[test]
    fn unknown_status_is_ignored_not_guessed() {
        let a = adapter();
        let body = serde_json::json!({
            "update_id": 9178,
            "update_type": "invoice_paid",
            "payload": {
                "invoice_id": 529,
                "status": "partially_paid",
                "amount": "10.00",
                "payload": null,
            }
        })
        .to_string()
        .into_bytes();

        let event = a.normalize_callback(&body).unwrap();
        assert!(matches!(
            event,
            CallbackEvent::Ignored { ref event_kind, .. } if event_kind == "invoice_partially_paid"
        ));
    }
}
