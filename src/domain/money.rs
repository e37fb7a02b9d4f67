use {
    super::error::SettlementError,
    serde::{Deserialize, Serialize},
    std::fmt,
    std::ops::{Add, Sub},
};

/// Amount in integer cents. All payments are denominated in USD, so the
/// currency is implicit and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(cents: i64) -> Result<Self, SettlementError> {
        if cents < 0 {
            return Err(SettlementError::InvalidRequest(format!(
                "amount cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    pub const ZERO: MoneyAmount = MoneyAmount(0);

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }

    /// Render as a provider-facing decimal string, e.g. `1050` -> `"10.50"`.
    pub fn to_usd_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }

    /// Parse a provider decimal string (`"10.5"`, `"10.50"`, `"10"`) back
    /// into cents. More than two fractional digits is rejected rather than
    /// rounded.
    pub fn from_usd_str(s: &str) -> Result<Self, SettlementError> {
        let bad = || SettlementError::InvalidRequest(format!("malformed amount: {s}"));
        if s.starts_with(['-', '+']) {
            return Err(bad());
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(bad());
        }
        let dollars: i64 = whole.parse().map_err(|_| bad())?;
        let cents_part: i64 = if frac.is_empty() {
            0
        } else {
            let parsed: i64 = frac.parse().map_err(|_| bad())?;
            if frac.len() == 1 { parsed * 10 } else { parsed }
        };
        let cents = dollars
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents_part))
            .ok_or_else(bad)?;
        Self::new(cents)
    }
}

impl Add for MoneyAmount {
    type Output = MoneyAmount;

    fn add(self, rhs: MoneyAmount) -> MoneyAmount {
        self.checked_add(rhs).expect("MoneyAmount overflow")
    }
}

impl Sub for MoneyAmount {
    type Output = MoneyAmount;

    fn sub(self, rhs: MoneyAmount) -> MoneyAmount {
        self.checked_sub(rhs).expect("MoneyAmount underflow")
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative() {
        assert!(MoneyAmount::new(-1).is_err());
        assert!(MoneyAmount::new(0).is_ok());
    }

    #[test]
    fn usd_string_roundtrip() {
        let amount = MoneyAmount::new(1050).unwrap();
        assert_eq!(amount.to_usd_string(), "10.50");
        assert_eq!(MoneyAmount::from_usd_str("10.50").unwrap(), amount);
    }

    #[test]
    fn parses_short_fractions() {
        assert_eq!(MoneyAmount::from_usd_str("10.5").unwrap().cents(), 1050);
        assert_eq!(MoneyAmount::from_usd_str("10").unwrap().cents(), 1000);
        assert_eq!(MoneyAmount::from_usd_str("0.07").unwrap().cents(), 7);
    }

    #[test]
    fn rejects_malformed_amounts() {
        for s in ["", ".", "10.505", "ten", "-5.00", "1.x"] {
            assert!(MoneyAmount::from_usd_str(s).is_err(), "accepted {s:?}");
        }
    }

    #[test]
    fn checked_sub_refuses_underflow() {
        let a = MoneyAmount::new(100).unwrap();
        let b = MoneyAmount::new(200).unwrap();
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a).unwrap().cents(), 100);
    }
}
