//! Card processor integration. Checkout sessions are confirmed client-side
//! with a client secret; callbacks carry a `t=<unix>,v1=<hex>` signature over
//! `"{t}.{body}"` with a replay tolerance window.

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

pub const PROVIDER: &str = "card";

/// Signed timestamps older (or newer) than this are rejected as replays.
const REPLAY_TOLERANCE_SECS: i64 = 300;

pub struct CardAdapter {
    api_base: String,
    webhook_secret: Secret,
    client: reqwest::Client,
}

impl CardAdapter {
    pub fn new(creds: &ProviderCredentials, timeout: Duration) -> Result<Self, SettlementError> {
        let mut headers = HeaderMap::with_capacity(1);
        let auth = HeaderValue::from_str(&format!("Bearer {}", creds.api_key.reveal()))
            .map_err(|e| SettlementError::ProviderUnavailable(format!("bad api key: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
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

    async fn create_session(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> Result<Checkout, SettlementError> {
        let body = serde_json::json!({
            "amount": amount.cents(),
            "currency": "usd",
            "reference": payment_id.to_string(),
        });

        let resp = self
            .client
            .post(format!("{}/v1/sessions", self.api_base))
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        if !resp.status().is_success() {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: session create returned {}",
                resp.status()
            )));
        }

        let session: Session = resp
            .json()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;

        Ok(Checkout {
            external_txn_id: Some(ExternalTxnId::new(session.id)?),
            data: CheckoutData::ClientSecret {
                client_secret: session.client_secret,
            },
        })
    }

    async fn refund_session(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> Result<(), SettlementError> {
        let body = serde_json::json!({
            "session": external_txn_id.as_str(),
            "amount": amount.cents(),
        });

        let resp = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
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

        let refund: Refund = resp
            .json()
            .await
            .map_err(|e| provider_http_error(PROVIDER, e))?;
        if refund.status != "succeeded" {
            return Err(SettlementError::ProviderUnavailable(format!(
                "{PROVIDER}: refund ended {}",
                refund.status
            )));
        }
        Ok(())
    }

    fn verify_at(&self, payload: &[u8], sig: &str, now_unix: i64) -> bool {
        let Some((ts, given)) = parse_signature_header(sig) else {
            return false;
        };
        if (now_unix - ts).abs() > REPLAY_TOLERANCE_SECS {
            return false;
        }
        let mut signed = format!("{ts}.").into_bytes();
        signed.extend_from_slice(payload);
        signature::verify_hex(self.webhook_secret.reveal(), &signed, given)
    }
}

/// `t=<unix>,v1=<hex>` -> (timestamp, hex signature).
fn parse_signature_header(header: &str) -> Option<(i64, &str)> {
    let mut ts = None;
    let mut sig = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => ts = v.parse::<i64>().ok(),
            Some(("v1", v)) => sig = Some(v),
            _ => {}
        }
    }
    Some((ts?, sig?))
}

#[derive(Deserialize)]
struct Session {
    id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct Refund {
    status: String,
}

#[derive(Deserialize)]
struct Event {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Deserialize)]
struct EventObject {
    id: String,
    amount: i64,
    reference: Option<String>,
}

impl ProviderAdapter for CardAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn signature_header(&self) -> &'static str {
        "x-card-signature"
    }

    fn verify_signature(&self, payload: &[u8], sig: &str) -> bool {
        self.verify_at(payload, sig, chrono::Utc::now().timestamp())
    }

    fn normalize_callback(&self, payload: &[u8]) -> Result<CallbackEvent, SettlementError> {
        let event: Event = serde_json::from_slice(payload)?;
        let raw: serde_json::Value = serde_json::from_slice(payload)?;
        let event_id = EventId::new(format!("card_{}", event.id))?;

        let status = match event.kind.as_str() {
            "payment.succeeded" => CanonicalStatus::Completed,
            "payment.failed" => CanonicalStatus::Failed,
            _ => {
                return Ok(CallbackEvent::Ignored {
                    event_id,
                    event_kind: event.kind,
                    raw,
                });
            }
        };

        Ok(CallbackEvent::Settlement(NormalizedCallback {
            event_id,
            event_kind: event.kind,
            external_txn_id: ExternalTxnId::new(event.data.object.id)?,
            correlation_id: event
                .data
                .object
                .reference
                .as_deref()
                .and_then(|r| Uuid::parse_str(r).ok()),
            status,
            amount: Some(MoneyAmount::new(event.data.object.amount)?),
            raw,
        }))
    }

    fn create_checkout(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<Checkout, SettlementError>> {
        Box::pin(async move { self.create_session(payment_id, amount).await })
    }

    fn refund_payment(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<(), SettlementError>> {
        let id = external_txn_id.clone();
        Box::pin(async move { self.refund_session(&id, amount).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> CardAdapter {
        let creds = ProviderCredentials {
            api_base: "https://api.cardgate.example".into(),
            api_key: Secret::new("sk_test"),
            webhook_secret: Secret::new("whsec_card"),
        };
        CardAdapter::new(&creds, Duration::from_secs(10)).unwrap()
    }

    fn sign(body: &[u8], secret: &str, ts: i64) -> String {
        let mut signed = format!("{ts}.").into_bytes();
        signed.extend_from_slice(body);
        format!("t={ts},v1={}", signature::sign_hex(secret, &signed))
    }

    #[test]
    fn accepts_fresh_signature() {
        let a = adapter();
        let body = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(body, "whsec_card", now);
        assert!(a.verify_at(body, &header, now + 10));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let a = adapter();
        let body = br#"{"id":"evt_1"}"#;
        let then = 1_700_000_000;
        let header = sign(body, "whsec_card", then);
        assert!(!a.verify_at(body, &header, then + REPLAY_TOLERANCE_SECS + 1));
    }

    #[test]
    fn rejects_wrong_secret_and_garbage_header() {
        let a = adapter();
        let body = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        assert!(!a.verify_at(body, &sign(body, "whsec_other", now), now));
        assert!(!a.verify_at(body, "v1=abcd", now));
        assert!(!a.verify_at(body, "t=notanumber,v1=abcd", now));
    }

    #[test]
    fn normalizes_succeeded_event() {
        let a = adapter();
        let reference = Uuid::now_v7();
        let body = serde_json::json!({
            "id": "evt_42",
            "type": "payment.succeeded",
            "data": { "object": { "id": "cs_99", "amount": 100_000, "reference": reference.to_string() } }
        })
        .to_string();

        let CallbackEvent::Settlement(cb) = a.normalize_callback(body.as_bytes()).unwrap() else {
            panic!("expected settlement event");
        };
        assert_eq!(cb.event_id.as_str(), "card_evt_42");
        assert_eq!(cb.external_txn_id.as_str(), "cs_99");
        assert_eq!(cb.correlation_id, Some(reference));
        assert_eq!(cb.status, CanonicalStatus::Completed);
        assert_eq!(cb.amount.unwrap().cents(), 100_000);
    }

    #[test]
    fn unknown_event_kind_is_ignored() {
        let a = adapter();
        let body = serde_json::json!({
            "id": "evt_43",
            "type": "payment.disputed",
            "data": { "object": { "id": "cs_99", "amount": 100, "reference": null } }
        })
        .to_string();

        let event = a.normalize_callback(body.as_bytes()).unwrap();
        assert!(matches!(
            event,
            CallbackEvent::Ignored { ref event_kind, .. } if event_kind == "payment.disputed"
        ));
    }
}
