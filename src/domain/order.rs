use {
    super::error::SettlementError,
    super::money::MoneyAmount,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    WebDevelopment,
    Design,
    Marketing,
    Seo,
    Consulting,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebDevelopment => "web_development",
            Self::Design => "design",
            Self::Marketing => "marketing",
            Self::Seo => "seo",
            Self::Consulting => "consulting",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ServiceKind {
    type Error = SettlementError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "web_development" => Ok(Self::WebDevelopment),
            "design" => Ok(Self::Design),
            "marketing" => Ok(Self::Marketing),
            "seo" => Ok(Self::Seo),
            "consulting" => Ok(Self::Consulting),
            other => Err(SettlementError::InvalidRequest(format!(
                "unknown service kind: {other}"
            ))),
        }
    }
}

/// Order status is admin-driven and deliberately independent of payment
/// status: an order can be done with an outstanding balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Review,
    Done,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = SettlementError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SettlementError::InvalidRequest(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_kind: ServiceKind,
    pub title: String,
    pub description: String,
    pub budget: Option<MoneyAmount>,
    pub status: OrderStatus,
    pub timeline: Option<String>,
    pub attachments: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For INSERT; id generated in Rust via `Uuid::now_v7()`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_kind: ServiceKind,
    pub title: String,
    pub description: String,
    pub budget: Option<MoneyAmount>,
    pub timeline: Option<String>,
    pub attachments: serde_json::Value,
}

impl NewOrder {
    pub fn new(
        user_id: Uuid,
        service_kind: ServiceKind,
        title: impl Into<String>,
        description: impl Into<String>,
        budget: Option<MoneyAmount>,
    ) -> Result<Self, SettlementError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(SettlementError::InvalidRequest(
                "order title cannot be empty".into(),
            ));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            user_id,
            service_kind,
            title,
            description: description.into(),
            budget,
            timeline: None,
            attachments: serde_json::json!([]),
        })
    }
}

/// Derived balance view. Never stored; recomputed from the payment rows on
/// every read so it cannot drift.
#[derive(Debug, Clone, Serialize)]
pub struct Balance {
    pub budget_cents: Option<i64>,
    pub paid_cents: i64,
    /// Negative when the order is overpaid; callers display, never block.
    pub remaining_cents: Option<i64>,
}
