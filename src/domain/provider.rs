use {
    super::error::SettlementError,
    super::id::{EventId, ExternalTxnId},
    super::money::MoneyAmount,
    super::payment::{PaymentMethod, PaymentStatus},
    serde::Serialize,
    std::collections::HashMap,
    std::sync::Arc,
    std::{future::Future, pin::Pin},
    uuid::Uuid,
};

/// Provider-specific data the client needs to complete payment out-of-band.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CheckoutData {
    /// Hosted checkout page the client is redirected to.
    Redirect { url: String },
    /// Client-side confirmation secret (card flows).
    ClientSecret { client_secret: String },
    /// Invoice the client pays from their crypto wallet.
    Invoice { invoice_url: String },
    /// Manual wire details; the payment id doubles as the wire reference.
    BankInstructions { reference: String },
}

/// What `create_checkout` hands back: opaque checkout data plus the
/// provider's transaction reference when it assigns one synchronously.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub external_txn_id: Option<ExternalTxnId>,
    pub data: CheckoutData,
}

/// Canonical outcome a provider callback can report. Anything the provider
/// says that does not map onto these two is ignored, never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalStatus {
    Completed,
    Failed,
}

impl CanonicalStatus {
    pub fn to_payment_status(self) -> PaymentStatus {
        match self {
            Self::Completed => PaymentStatus::Completed,
            Self::Failed => PaymentStatus::Failed,
        }
    }
}

/// Provider vocabulary normalized to the canonical settlement tuple.
#[derive(Debug, Clone)]
pub struct NormalizedCallback {
    pub event_id: EventId,
    /// Provider's own name for the event, kept for the event log.
    pub event_kind: String,
    pub external_txn_id: ExternalTxnId,
    /// Merchant correlation reference we embedded at checkout time, the
    /// payment's own id. Used for matching when the provider assigned its
    /// transaction id after our checkout call.
    pub correlation_id: Option<Uuid>,
    pub status: CanonicalStatus,
    pub amount: Option<MoneyAmount>,
    pub raw: serde_json::Value,
}

/// A verified, parsed callback: either a settlement-relevant event or one we
/// record for dedup and otherwise leave alone.
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    Settlement(NormalizedCallback),
    Ignored {
        event_id: EventId,
        event_kind: String,
        raw: serde_json::Value,
    },
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Integration boundary to one external payment processor.
///
/// Implementations must embed the payment id as the merchant correlation
/// reference in `create_checkout`, use constant-time comparison in
/// `verify_signature`, and map unknown provider statuses to
/// `CallbackEvent::Ignored`.
pub trait ProviderAdapter: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Name of the HTTP header carrying the callback signature.
    fn signature_header(&self) -> &'static str;

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;

    fn normalize_callback(&self, payload: &[u8]) -> Result<CallbackEvent, SettlementError>;

    fn create_checkout(
        &self,
        payment_id: Uuid,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<Checkout, SettlementError>>;

    /// Provider-side refund. Must fail loudly; the local record is only
    /// flipped after this succeeds.
    fn refund_payment(
        &self,
        external_txn_id: &ExternalTxnId,
        amount: MoneyAmount,
    ) -> BoxFuture<'_, Result<(), SettlementError>>;
}

/// Method-to-adapter mapping resolved once at startup. Adding a provider
/// means one adapter plus one `register` call.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<PaymentMethod, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.method(), adapter);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&method)
    }
}
