use std::{
    env,
    fmt::{self, Debug, Display},
    str::FromStr,
    time::Duration,
};

use tracing::info;

/// Credential wrapper that redacts itself in logs and debug output.
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// API credentials for one payment provider. Supplied via environment,
/// injected into the adapter at construction; business logic never reads
/// the ambient environment.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub api_base: String,
    pub api_key: Secret,
    pub webhook_secret: Secret,
}

impl ProviderCredentials {
    fn load(prefix: &str, default_base: &str) -> Self {
        Self {
            api_base: try_load(&format!("{prefix}_API_BASE"), default_base),
            api_key: Secret::new(require(&format!("{prefix}_API_KEY"))),
            webhook_secret: Secret::new(require(&format!("{prefix}_WEBHOOK_SECRET"))),
        }
    }
}

/// Immutable process configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    /// Outbound provider call timeout; a timed-out call is treated as
    /// provider-unavailable, never as success.
    pub provider_timeout: Duration,
    /// Pending payments older than this are swept to failed.
    pub stale_payment_ttl: Duration,
    /// Window for the best-effort double-submit guard on initiate.
    pub duplicate_guard: Duration,
    /// Completed totals may exceed budget by this much before the order is
    /// flagged as overpaid.
    pub overpay_tolerance_cents: i64,
    pub crypto_pay: ProviderCredentials,
    pub card: ProviderCredentials,
    pub wallet: ProviderCredentials,
}

impl AppConfig {
    pub fn load() -> Self {
        Self {
            database_url: require("DATABASE_URL"),
            bind_addr: try_load("PAYDESK_BIND_ADDR", "0.0.0.0:3000"),
            max_connections: try_load("PAYDESK_MAX_DB_CONNECTIONS", "20"),
            provider_timeout: Duration::from_secs(try_load(
                "PAYDESK_PROVIDER_TIMEOUT_SECS",
                "10",
            )),
            stale_payment_ttl: Duration::from_secs(try_load(
                "PAYDESK_STALE_PAYMENT_TTL_SECS",
                "86400",
            )),
            duplicate_guard: Duration::from_secs(try_load(
                "PAYDESK_DUPLICATE_GUARD_SECS",
                "30",
            )),
            overpay_tolerance_cents: try_load("PAYDESK_OVERPAY_TOLERANCE_CENTS", "0"),
            crypto_pay: ProviderCredentials::load(
                "PAYDESK_CRYPTO_PAY",
                "https://pay.crypt.example",
            ),
            card: ProviderCredentials::load("PAYDESK_CARD", "https://api.cardgate.example"),
            wallet: ProviderCredentials::load("PAYDESK_WALLET", "https://wallet.example"),
        }
    }
}

fn require(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .unwrap_or_else(|e| panic!("invalid {key} value: {e}"))
}
