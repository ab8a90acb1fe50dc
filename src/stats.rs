//! Dashboard metrics derived from subscriptions and cashback figures.
//!
//! Nothing here is cached: metrics are recomputed from the source values on
//! every read, and "today" is evaluated at call time so month boundaries roll
//! over on their own.

use chrono::{Datelike, Local, NaiveDate};

use crate::billing::types::{PaymentPeriod, SubscriptionRecord};

/// Numbers shown on the client dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivedMetrics {
  pub total_subscriptions: usize,
  pub active_subscriptions: usize,
  /// Subscriptions paid up to some day between today and the end of this month
  pub expiring_soon: usize,
  /// Monthly cost of all active subscriptions, rounded
  pub monthly_total: i64,
  pub total_cashback: i64,
  pub current_balance: i64,
}

/// Compute dashboard metrics as of the local current date.
pub fn aggregate(
  subscriptions: &[SubscriptionRecord],
  total_cashback: f64,
  balance: f64,
) -> DerivedMetrics {
  aggregate_at(
    subscriptions,
    total_cashback,
    balance,
    Local::now().date_naive(),
  )
}

/// Compute dashboard metrics as of `today`.
pub fn aggregate_at(
  subscriptions: &[SubscriptionRecord],
  total_cashback: f64,
  balance: f64,
  today: NaiveDate,
) -> DerivedMetrics {
  let month_end = end_of_month(today);

  let active_subscriptions = subscriptions.iter().filter(|s| s.is_active()).count();

  let expiring_soon = subscriptions
    .iter()
    .filter(|s| {
      s.paid_until
        .is_some_and(|paid_until| today <= paid_until && paid_until <= month_end)
    })
    .count();

  let monthly: f64 = subscriptions
    .iter()
    .filter(|s| s.is_active())
    .map(|s| monthly_cost(s.payment_amount, s.payment_period))
    .sum();

  DerivedMetrics {
    total_subscriptions: subscriptions.len(),
    active_subscriptions,
    expiring_soon,
    monthly_total: round_amount(monthly),
    total_cashback: round_amount(total_cashback),
    current_balance: round_amount(balance),
  }
}

/// Normalize a payment to its monthly equivalent.
pub fn monthly_cost(amount: f64, period: PaymentPeriod) -> f64 {
  amount / f64::from(period.months())
}

/// Last calendar day of the month `date` falls in.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
  let (year, month) = if date.month() == 12 {
    (date.year() + 1, 1)
  } else {
    (date.year(), date.month() + 1)
  };

  NaiveDate::from_ymd_opt(year, month, 1)
    .and_then(|first_of_next| first_of_next.pred_opt())
    .unwrap_or(NaiveDate::MAX)
}

/// Round half away from zero to whole currency units.
fn round_amount(amount: f64) -> i64 {
  amount.round() as i64
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::billing::types::SubscriptionStatus;

  fn subscription(
    status: SubscriptionStatus,
    amount: f64,
    period: PaymentPeriod,
    paid_until: Option<NaiveDate>,
  ) -> SubscriptionRecord {
    SubscriptionRecord {
      id: 0,
      status,
      payment_amount: amount,
      payment_period: period,
      paid_until,
      service_name: None,
      service_icon: None,
    }
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn test_dashboard_scenario() {
    let subs = vec![
      subscription(SubscriptionStatus::Active, 1200.0, PaymentPeriod::Yearly, None),
      subscription(SubscriptionStatus::Active, 300.0, PaymentPeriod::Quarterly, None),
      subscription(SubscriptionStatus::Canceled, 500.0, PaymentPeriod::Monthly, None),
    ];

    let metrics = aggregate_at(&subs, 1500.7, 320.4, date(2024, 5, 10));

    assert_eq!(metrics.total_subscriptions, 3);
    assert_eq!(metrics.active_subscriptions, 2);
    assert_eq!(metrics.monthly_total, 200);
    assert_eq!(metrics.total_cashback, 1501);
    assert_eq!(metrics.current_balance, 320);
    assert_eq!(metrics.expiring_soon, 0);
  }

  #[test]
  fn test_expiring_soon_window_is_inclusive() {
    let today = date(2024, 5, 10);
    let subs = vec![
      subscription(SubscriptionStatus::Active, 10.0, PaymentPeriod::Monthly, Some(date(2024, 5, 31))),
      subscription(SubscriptionStatus::Active, 10.0, PaymentPeriod::Monthly, Some(date(2024, 6, 1))),
      subscription(SubscriptionStatus::Active, 10.0, PaymentPeriod::Monthly, Some(today)),
      subscription(SubscriptionStatus::Active, 10.0, PaymentPeriod::Monthly, Some(date(2024, 5, 9))),
    ];

    assert_eq!(aggregate_at(&subs, 0.0, 0.0, today).expiring_soon, 2);
  }

  #[test]
  fn test_unrecognized_period_counts_as_monthly() {
    let subs = vec![subscription(
      SubscriptionStatus::Active,
      49.6,
      PaymentPeriod::Other,
      None,
    )];

    assert_eq!(aggregate_at(&subs, 0.0, 0.0, date(2024, 1, 1)).monthly_total, 50);
  }

  #[test]
  fn test_inactive_amounts_are_ignored() {
    let subs = vec![
      subscription(SubscriptionStatus::Pending, 100.0, PaymentPeriod::Monthly, None),
      subscription(SubscriptionStatus::Expired, 100.0, PaymentPeriod::Monthly, None),
    ];

    let metrics = aggregate_at(&subs, 0.0, 0.0, date(2024, 1, 1));
    assert_eq!(metrics.active_subscriptions, 0);
    assert_eq!(metrics.monthly_total, 0);
  }

  #[test]
  fn test_rounding_only_at_the_boundary() {
    // Three 0.4 monthly costs round to 1 only when summed first.
    let subs = vec![
      subscription(SubscriptionStatus::Active, 1.2, PaymentPeriod::Quarterly, None),
      subscription(SubscriptionStatus::Active, 1.2, PaymentPeriod::Quarterly, None),
      subscription(SubscriptionStatus::Active, 1.2, PaymentPeriod::Quarterly, None),
    ];

    assert_eq!(aggregate_at(&subs, 0.0, -2.5, date(2024, 1, 1)).monthly_total, 1);
    assert_eq!(aggregate_at(&subs, 0.0, -2.5, date(2024, 1, 1)).current_balance, -3);
  }

  #[test]
  fn test_aggregate_is_pure() {
    let subs = vec![subscription(
      SubscriptionStatus::Active,
      99.0,
      PaymentPeriod::Monthly,
      Some(date(2024, 2, 29)),
    )];
    let today = date(2024, 2, 1);

    assert_eq!(
      aggregate_at(&subs, 10.0, 5.0, today),
      aggregate_at(&subs, 10.0, 5.0, today)
    );
  }

  #[test]
  fn test_end_of_month() {
    assert_eq!(end_of_month(date(2024, 2, 10)), date(2024, 2, 29));
    assert_eq!(end_of_month(date(2023, 2, 1)), date(2023, 2, 28));
    assert_eq!(end_of_month(date(2024, 12, 31)), date(2024, 12, 31));
    assert_eq!(end_of_month(date(2024, 4, 30)), date(2024, 4, 30));
  }
}
