use {
    super::error::SettlementError,
    super::money::MoneyAmount,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CryptoPay,
    Card,
    Wallet,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CryptoPay => "crypto_pay",
            Self::Card => "card",
            Self::Wallet => "wallet",
            Self::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = SettlementError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "crypto_pay" => Ok(Self::CryptoPay),
            "card" => Ok(Self::Card),
            "wallet" => Ok(Self::Wallet),
            "bank_transfer" => Ok(Self::BankTransfer),
            other => Err(SettlementError::InvalidRequest(format!(
                "unsupported payment method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// The settlement partial order: pending -> {completed, failed},
    /// completed -> refunded. Failed and refunded are terminal.
    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = SettlementError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(SettlementError::InvalidRequest(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Full payment record from the DB (for reads). Fields are private so status
/// can only change through the repository's guarded update.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    id: Uuid,
    order_id: Uuid,
    amount: MoneyAmount,
    method: PaymentMethod,
    status: PaymentStatus,
    external_txn_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_db(
        id: Uuid,
        order_id: Uuid,
        amount: MoneyAmount,
        method: PaymentMethod,
        status: PaymentStatus,
        external_txn_id: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            amount,
            method,
            status,
            external_txn_id,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn status(&self) -> &PaymentStatus {
        &self.status
    }

    pub fn external_txn_id(&self) -> Option<&str> {
        self.external_txn_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// For INSERT; always created pending; id generated via `Uuid::now_v7()`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    id: Uuid,
    order_id: Uuid,
    amount: MoneyAmount,
    method: PaymentMethod,
}

impl NewPayment {
    pub fn new(
        order_id: Uuid,
        amount: MoneyAmount,
        method: PaymentMethod,
    ) -> Result<Self, SettlementError> {
        if amount.is_zero() {
            return Err(SettlementError::InvalidRequest(
                "payment amount must be positive".into(),
            ));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            order_id,
            amount,
            method,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_order_allows_exactly_three_edges() {
        use PaymentStatus::*;
        let all = [Pending, Completed, Failed, Refunded];
        let mut edges = Vec::new();
        for from in all {
            for to in all {
                if from.can_transition_to(&to) {
                    edges.push((from, to));
                }
            }
        }
        assert_eq!(
            edges,
            vec![(Pending, Completed), (Pending, Failed), (Completed, Refunded)]
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
    }

    #[test]
    fn status_roundtrip() {
        use PaymentStatus::*;
        for status in [Pending, Completed, Failed, Refunded] {
            assert_eq!(PaymentStatus::try_from(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn new_payment_rejects_zero_amount() {
        let err = NewPayment::new(
            Uuid::now_v7(),
            MoneyAmount::ZERO,
            PaymentMethod::Card,
        );
        assert!(err.is_err());
    }
}
