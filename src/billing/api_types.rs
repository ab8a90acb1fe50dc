//! Serde-deserializable types matching billing API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Deserializer};

use super::types::{
  CashbackTransaction, PaymentPeriod, ServiceStat, SubscriptionRecord, SubscriptionStatus,
  UserId, UserSummary,
};

// ============================================================================
// Field decoding helpers
// ============================================================================

/// Decimals arrive either as JSON numbers or as strings (ORM decimal columns).
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawDecimal {
    Number(f64),
    Text(String),
  }

  let value = match RawDecimal::deserialize(deserializer)? {
    RawDecimal::Number(n) => n,
    RawDecimal::Text(s) => s
      .trim()
      .parse::<f64>()
      .map_err(|e| serde::de::Error::custom(format!("invalid decimal {:?}: {}", s, e)))?,
  };

  if value.is_finite() {
    Ok(value)
  } else {
    Err(serde::de::Error::custom("decimal must be finite"))
  }
}

/// Parse a calendar date sent either as `YYYY-MM-DD` or as an RFC 3339 timestamp.
///
/// Timestamps are taken at their UTC date, not the local one. The service
/// stores `paidUntil` as a date column and serializes it as UTC midnight, so
/// converting to local time would move it a day back west of UTC. The result
/// is compared against the local "today" as a plain calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc).date_naive()))
    .map_err(|e| eyre!("Invalid date '{}': {}", s, e))
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiService {
  pub name: String,
  pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSubscription {
  pub id: u64,
  pub status: SubscriptionStatus,
  #[serde(deserialize_with = "deserialize_decimal")]
  pub payment_amount: f64,
  pub payment_period: PaymentPeriod,
  pub paid_until: Option<String>,
  pub service: Option<ApiService>,
}

impl ApiSubscription {
  pub fn into_record(self) -> Result<SubscriptionRecord> {
    if self.payment_amount < 0.0 {
      return Err(eyre!(
        "Subscription {} has negative payment amount {}",
        self.id,
        self.payment_amount
      ));
    }

    let paid_until = self
      .paid_until
      .as_deref()
      .filter(|s| !s.trim().is_empty())
      .map(parse_date)
      .transpose()
      .map_err(|e| eyre!("Subscription {}: {}", self.id, e))?;

    let (service_name, service_icon) = match self.service {
      Some(service) => (Some(service.name), service.icon),
      None => (None, None),
    };

    Ok(SubscriptionRecord {
      id: self.id,
      status: self.status,
      payment_amount: self.payment_amount,
      payment_period: self.payment_period,
      paid_until,
      service_name,
      service_icon,
    })
  }
}

// ============================================================================
// Cashback
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCashbackTotal {
  #[serde(deserialize_with = "deserialize_decimal")]
  pub total: f64,
}

#[derive(Debug, Deserialize)]
pub struct ApiCashbackBalance {
  #[serde(deserialize_with = "deserialize_decimal")]
  pub balance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTransaction {
  pub id: u64,
  pub user_id: u64,
  #[serde(deserialize_with = "deserialize_decimal")]
  pub amount: f64,
  #[serde(default)]
  pub description: String,
  pub created_at: DateTime<Utc>,
}

impl From<ApiTransaction> for CashbackTransaction {
  fn from(tx: ApiTransaction) -> Self {
    CashbackTransaction {
      id: tx.id,
      user_id: UserId(tx.user_id),
      amount: tx.amount,
      description: tx.description,
      created_at: tx.created_at,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiTransactionsResponse {
  #[serde(alias = "transactions", default)]
  pub items: Vec<ApiTransaction>,
  pub total: u64,
}

// ============================================================================
// Admin dashboard
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  pub email: String,
  #[serde(default)]
  pub role: String,
}

impl From<ApiUser> for UserSummary {
  fn from(user: ApiUser) -> Self {
    UserSummary {
      id: UserId(user.id),
      name: user.name,
      email: user.email,
      is_admin: user.role.eq_ignore_ascii_case("admin"),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServiceStat {
  pub service_id: u64,
  pub name: String,
  #[serde(default)]
  pub active_subscriptions: u64,
  #[serde(default)]
  pub total_subscriptions: u64,
}

impl From<ApiServiceStat> for ServiceStat {
  fn from(stat: ApiServiceStat) -> Self {
    ServiceStat {
      service_id: stat.service_id,
      name: stat.name,
      active_subscriptions: stat.active_subscriptions,
      total_subscriptions: stat.total_subscriptions,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_subscription_decodes_string_decimal_and_timestamp() {
    let json = r#"{
      "id": 7,
      "status": "active",
      "paymentAmount": "299.90",
      "paymentPeriod": "monthly",
      "paidUntil": "2024-05-31T00:00:00.000Z",
      "service": { "name": "Netflix", "icon": "/uploads/netflix.png" }
    }"#;

    let record = serde_json::from_str::<ApiSubscription>(json)
      .unwrap()
      .into_record()
      .unwrap();

    assert_eq!(record.payment_amount, 299.9);
    assert_eq!(record.paid_until, NaiveDate::from_ymd_opt(2024, 5, 31));
    assert_eq!(record.service_name.as_deref(), Some("Netflix"));
    assert_eq!(record.service_icon.as_deref(), Some("/uploads/netflix.png"));
  }

  #[test]
  fn test_subscription_without_paid_until() {
    let json = r#"{"id": 1, "status": "pending", "paymentAmount": 100,
      "paymentPeriod": "yearly", "paidUntil": null}"#;

    let record = serde_json::from_str::<ApiSubscription>(json)
      .unwrap()
      .into_record()
      .unwrap();

    assert_eq!(record.paid_until, None);
    assert_eq!(record.payment_period, PaymentPeriod::Yearly);
  }

  #[test]
  fn test_subscription_rejects_bad_values() {
    let bad_date = r#"{"id": 1, "status": "active", "paymentAmount": 1,
      "paymentPeriod": "monthly", "paidUntil": "next week"}"#;
    assert!(serde_json::from_str::<ApiSubscription>(bad_date)
      .unwrap()
      .into_record()
      .is_err());

    let negative = r#"{"id": 1, "status": "active", "paymentAmount": -5,
      "paymentPeriod": "monthly"}"#;
    assert!(serde_json::from_str::<ApiSubscription>(negative)
      .unwrap()
      .into_record()
      .is_err());

    let not_a_number = r#"{"id": 1, "status": "active", "paymentAmount": "abc",
      "paymentPeriod": "monthly"}"#;
    assert!(serde_json::from_str::<ApiSubscription>(not_a_number).is_err());
  }

  #[test]
  fn test_transactions_response_accepts_either_list_name() {
    let json = r#"{"transactions": [
      {"id": 1, "userId": 3, "amount": "-42.5", "description": "Withdrawal",
       "createdAt": "2024-04-01T10:00:00Z"}
    ], "total": 11}"#;

    let response: ApiTransactionsResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.total, 11);

    let tx = CashbackTransaction::from(response.items.into_iter().next().unwrap());
    assert_eq!(tx.user_id, UserId(3));
    assert_eq!(tx.amount, -42.5);
  }

  #[test]
  fn test_user_role_maps_to_admin_flag() {
    let user: ApiUser =
      serde_json::from_str(r#"{"id": 2, "email": "a@b.c", "role": "ADMIN"}"#).unwrap();
    assert!(UserSummary::from(user).is_admin);
  }

  #[test]
  fn test_parse_date_takes_utc_calendar_date() {
    assert_eq!(
      parse_date("2024-05-31T00:00:00.000Z").unwrap(),
      NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
    );
    assert_eq!(
      parse_date("2024-05-31T23:30:00-02:00").unwrap(),
      NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    );
  }

  #[test]
  fn test_parse_date_plain() {
    assert_eq!(
      parse_date("2024-02-29").unwrap(),
      NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert!(parse_date("2023-02-29").is_err());
  }
}
