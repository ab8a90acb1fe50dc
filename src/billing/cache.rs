//! Cache keys for billing API calls.

use crate::cache::{CacheKey, UserScoped};

use super::types::UserId;

/// Query key types for billing API calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BillingKey {
  /// All subscriptions of a user
  Subscriptions { user: UserId },
  /// Lifetime cashback earned by a user
  CashbackTotal { user: UserId },
  /// Current cashback balance of a user
  CashbackBalance { user: UserId },
  /// One page of a user's cashback transactions
  Transactions {
    user: UserId,
    page: u32,
    page_size: u32,
  },
  /// All accounts (admin)
  Users,
  /// Per-service subscription counts (admin)
  ServiceStats,
}

impl CacheKey for BillingKey {
  fn description(&self) -> String {
    match self {
      Self::Subscriptions { user } => format!("subscriptions for user {}", user),
      Self::CashbackTotal { user } => format!("cashback total for user {}", user),
      Self::CashbackBalance { user } => format!("cashback balance for user {}", user),
      Self::Transactions {
        user,
        page,
        page_size,
      } => format!(
        "transactions for user {} (page {}, {} per page)",
        user, page, page_size
      ),
      Self::Users => "all users".to_string(),
      Self::ServiceStats => "service stats".to_string(),
    }
  }
}

impl UserScoped for BillingKey {
  type User = UserId;

  fn user(&self) -> Option<&UserId> {
    match self {
      Self::Subscriptions { user }
      | Self::CashbackTotal { user }
      | Self::CashbackBalance { user }
      | Self::Transactions { user, .. } => Some(user),
      Self::Users | Self::ServiceStats => None,
    }
  }

  fn is_user_scoped(&self) -> bool {
    matches!(
      self,
      Self::Subscriptions { .. }
        | Self::CashbackTotal { .. }
        | Self::CashbackBalance { .. }
        | Self::Transactions { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pages_are_distinct_keys() {
    let first = BillingKey::Transactions {
      user: UserId(1),
      page: 1,
      page_size: 10,
    };
    let second = BillingKey::Transactions {
      user: UserId(1),
      page: 2,
      page_size: 10,
    };
    assert_ne!(first, second);
    assert_eq!(first.user(), second.user());
  }

  #[test]
  fn test_admin_keys_are_not_user_scoped() {
    assert!(!BillingKey::Users.is_user_scoped());
    assert!(!BillingKey::ServiceStats.is_user_scoped());
    assert!(BillingKey::CashbackBalance { user: UserId(3) }.is_user_scoped());
  }

  #[test]
  fn test_description() {
    let key = BillingKey::Transactions {
      user: UserId(4),
      page: 2,
      page_size: 25,
    };
    assert_eq!(
      key.description(),
      "transactions for user 4 (page 2, 25 per page)"
    );
  }
}
