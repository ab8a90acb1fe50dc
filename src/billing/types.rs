use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an account on the billing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

/// Lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
  Active,
  Pending,
  Expired,
  Canceled,
}

/// How often a subscription is billed.
///
/// Unrecognized periods decode as `Other` and are billed as monthly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPeriod {
  Monthly,
  Quarterly,
  Yearly,
  #[serde(other)]
  Other,
}

impl PaymentPeriod {
  /// Number of months one payment covers.
  pub fn months(self) -> u32 {
    match self {
      PaymentPeriod::Yearly => 12,
      PaymentPeriod::Quarterly => 3,
      PaymentPeriod::Monthly | PaymentPeriod::Other => 1,
    }
  }
}

/// A user's subscription to a service
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
  pub id: u64,
  pub status: SubscriptionStatus,
  /// Only meaningful while the subscription is active
  pub payment_amount: f64,
  pub payment_period: PaymentPeriod,
  pub paid_until: Option<NaiveDate>,
  pub service_name: Option<String>,
  pub service_icon: Option<String>,
}

impl SubscriptionRecord {
  pub fn is_active(&self) -> bool {
    self.status == SubscriptionStatus::Active
  }
}

/// Whether a transaction adds to or draws from the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
  Credit,
  Debit,
}

/// A single cashback ledger movement
#[derive(Debug, Clone, PartialEq)]
pub struct CashbackTransaction {
  pub id: u64,
  pub user_id: UserId,
  /// Signed: positive is a credit, negative a debit
  pub amount: f64,
  pub description: String,
  pub created_at: DateTime<Utc>,
}

impl CashbackTransaction {
  pub fn kind(&self) -> TransactionKind {
    if self.amount < 0.0 {
      TransactionKind::Debit
    } else {
      TransactionKind::Credit
    }
  }
}

/// One page of the cashback ledger
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPage {
  pub items: Vec<CashbackTransaction>,
  /// Total number of transactions across all pages
  pub total: u64,
  pub page: u32,
  pub page_size: u32,
}

/// Account summary for the admin dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
  pub id: UserId,
  pub name: String,
  pub email: String,
  pub is_admin: bool,
}

/// Per-service subscription counts for the admin dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStat {
  pub service_id: u64,
  pub name: String,
  pub active_subscriptions: u64,
  pub total_subscriptions: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transaction_kind_follows_sign() {
    let mut tx = CashbackTransaction {
      id: 1,
      user_id: UserId(1),
      amount: 12.5,
      description: "Cashback".to_string(),
      created_at: Utc::now(),
    };
    assert_eq!(tx.kind(), TransactionKind::Credit);

    tx.amount = -3.0;
    assert_eq!(tx.kind(), TransactionKind::Debit);
  }

  #[test]
  fn test_unknown_period_decodes_as_other() {
    let period: PaymentPeriod = serde_json::from_str("\"weekly\"").unwrap();
    assert_eq!(period, PaymentPeriod::Other);
    assert_eq!(period.months(), 1);
  }

  #[test]
  fn test_unknown_status_is_rejected() {
    assert!(serde_json::from_str::<SubscriptionStatus>("\"paused\"").is_err());
  }
}
