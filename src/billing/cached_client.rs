//! Cached billing client that wraps a `BillingApi` with transparent caching.

use std::sync::Arc;

use color_eyre::Result;

use crate::cache::{
  AssetCache, AssetLoader, AssetRequest, CacheError, CacheInvalidator, CacheResult,
  HttpAssetLoader, Refresh, ResourceCache,
};
use crate::config::{CacheConfig, Config};
use crate::stats::{self, DerivedMetrics};

use super::cache::BillingKey;
use super::client::{BillingApi, BillingClient};
use super::types::{LedgerPage, ServiceStat, SubscriptionRecord, UserId, UserSummary};

/// Billing client with transparent caching support.
///
/// Reads go through a shared [`ResourceCache`], service icons through an
/// [`AssetCache`]. Clones share both caches.
#[derive(Clone)]
pub struct CachedBillingClient {
  inner: Arc<dyn BillingApi>,
  cache: ResourceCache<BillingKey>,
  invalidator: Arc<CacheInvalidator<BillingKey>>,
  assets: AssetCache,
  policies: CacheConfig,
}

impl CachedBillingClient {
  /// Create a cached client talking HTTP to the configured billing service.
  pub fn new(config: &Config) -> Result<Self> {
    let inner = BillingClient::new(config)?;
    let loader = HttpAssetLoader::new(config.api.url.clone(), config.api.timeout)?;

    Ok(Self::with_parts(
      inner,
      loader,
      config.cache.clone(),
      config.user_id,
    ))
  }

  pub fn with_parts(
    api: impl BillingApi,
    loader: impl AssetLoader,
    policies: CacheConfig,
    user: Option<UserId>,
  ) -> Self {
    let cache = ResourceCache::new();
    let invalidator = Arc::new(CacheInvalidator::new(cache.clone(), user));

    Self {
      inner: Arc::new(api),
      cache,
      invalidator,
      assets: AssetCache::new(loader),
      policies,
    }
  }

  /// Get a user's subscriptions with caching.
  pub async fn subscriptions(
    &self,
    user: UserId,
  ) -> Result<CacheResult<Vec<SubscriptionRecord>>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .get(
        BillingKey::Subscriptions { user },
        self.policies.standard,
        move || inner.subscriptions(user),
      )
      .await
  }

  /// Re-read a user's subscriptions after they were changed elsewhere.
  pub async fn reload_subscriptions(
    &self,
    user: UserId,
  ) -> Result<CacheResult<Vec<SubscriptionRecord>>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .refetch(
        BillingKey::Subscriptions { user },
        self.policies.standard,
        move || inner.subscriptions(user),
      )
      .await
  }

  pub async fn cashback_total(&self, user: UserId) -> Result<CacheResult<f64>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .get(
        BillingKey::CashbackTotal { user },
        self.policies.standard,
        move || inner.cashback_total(user),
      )
      .await
  }

  pub async fn cashback_balance(&self, user: UserId) -> Result<CacheResult<f64>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .get(
        BillingKey::CashbackBalance { user },
        self.policies.standard,
        move || inner.cashback_balance(user),
      )
      .await
  }

  /// Get one page of the cashback ledger. Every page is its own entry.
  pub async fn transactions_page(
    &self,
    user: UserId,
    page: u32,
    page_size: u32,
  ) -> Result<CacheResult<LedgerPage>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .get(
        BillingKey::Transactions {
          user,
          page,
          page_size,
        },
        self.policies.ledger,
        move || inner.transactions(user, page, page_size),
      )
      .await
  }

  /// Get all accounts (admin) with caching.
  pub async fn users(&self) -> Result<CacheResult<Vec<UserSummary>>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .get(BillingKey::Users, self.policies.standard, move || {
        inner.users()
      })
      .await
  }

  /// Get per-service subscription counts (admin) with caching.
  pub async fn service_stats(&self) -> Result<CacheResult<Vec<ServiceStat>>, CacheError> {
    let inner = Arc::clone(&self.inner);
    self
      .cache
      .get(BillingKey::ServiceStats, self.policies.standard, move || {
        inner.service_stats()
      })
      .await
  }

  /// Warm everything the dashboard reads for `user` without waiting.
  ///
  /// Returns handles for the fetches actually started.
  pub fn prefetch_dashboard(&self, user: UserId) -> Vec<Refresh> {
    let policy = self.policies.prefetch;

    let subscriptions = {
      let inner = Arc::clone(&self.inner);
      self
        .cache
        .prefetch(BillingKey::Subscriptions { user }, policy, move || {
          inner.subscriptions(user)
        })
    };
    let total = {
      let inner = Arc::clone(&self.inner);
      self
        .cache
        .prefetch(BillingKey::CashbackTotal { user }, policy, move || {
          inner.cashback_total(user)
        })
    };
    let balance = {
      let inner = Arc::clone(&self.inner);
      self
        .cache
        .prefetch(BillingKey::CashbackBalance { user }, policy, move || {
          inner.cashback_balance(user)
        })
    };

    [subscriptions, total, balance]
      .into_iter()
      .flatten()
      .collect()
  }

  /// Dashboard metrics for `user`, recomputed from the cached source values
  /// on every call.
  pub async fn dashboard_metrics(&self, user: UserId) -> Result<DerivedMetrics, CacheError> {
    let (subscriptions, total, balance) = futures::try_join!(
      self.subscriptions(user),
      self.cashback_total(user),
      self.cashback_balance(user),
    )?;

    Ok(stats::aggregate(
      &subscriptions.data,
      total.data,
      balance.data,
    ))
  }

  /// Record a change of the active user, evicting the previous user's data.
  ///
  /// The new user's dashboard is prefetched. Returns whether anything changed.
  pub fn switch_user(&self, user: Option<UserId>) -> bool {
    let changed = self.invalidator.switch_user(user);
    if let (true, Some(user)) = (changed, user) {
      self.prefetch_dashboard(user);
    }
    changed
  }

  pub fn current_user(&self) -> Option<UserId> {
    self.invalidator.current_user()
  }

  pub fn assets(&self) -> &AssetCache {
    &self.assets
  }

  /// Start (or reuse) the load of a subscription's service icon.
  pub fn resolve_icon(&self, subscription: &SubscriptionRecord) -> AssetRequest {
    self.assets.resolve(subscription.service_icon.as_deref())
  }
}

impl std::fmt::Debug for CachedBillingClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CachedBillingClient")
      .field("cache", &self.cache)
      .field("assets", &self.assets)
      .field("current_user", &self.current_user())
      .finish()
  }
}
