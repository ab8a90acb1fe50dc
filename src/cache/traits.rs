//! Core traits and types for the caching system.

use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::Deserialize;
use tokio::time::Instant;

use super::error::CacheError;
use super::storage::Fetched;

/// Trait for keys the resource cache can be addressed by.
///
/// Keys are compared structurally; `description` is only used for logging and
/// error messages.
pub trait CacheKey: Clone + Eq + Hash + Send + Sync + 'static {
  /// Human readable description of the resource (e.g., "subscriptions for user 7")
  fn description(&self) -> String;
}

impl CacheKey for String {
  fn description(&self) -> String {
    self.clone()
  }
}

impl CacheKey for &'static str {
  fn description(&self) -> String {
    (*self).to_string()
  }
}

/// Staleness and retention windows for one class of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CachePolicy {
  /// Age after which a value is served only while it is being refreshed
  #[serde(with = "humantime_serde")]
  pub stale_after: Duration,
  /// Age after which a value is purged and never served
  #[serde(with = "humantime_serde")]
  pub retain_for: Duration,
}

impl CachePolicy {
  pub const fn new(stale_after: Duration, retain_for: Duration) -> Self {
    Self {
      stale_after,
      retain_for,
    }
  }

  /// General purpose reads.
  pub const fn standard() -> Self {
    Self::new(Duration::from_secs(30), Duration::from_secs(5 * 60))
  }

  /// Entries warmed ahead of use.
  pub const fn prefetch() -> Self {
    Self::new(Duration::from_secs(60), Duration::from_secs(5 * 60))
  }

  /// Individual ledger pages.
  pub const fn ledger() -> Self {
    Self::new(Duration::from_secs(30), Duration::from_secs(3 * 60))
  }

  pub(crate) fn is_fresh(&self, fetched_at: Instant, now: Instant) -> bool {
    now.saturating_duration_since(fetched_at) < self.stale_after
  }

  pub(crate) fn is_retained(&self, fetched_at: Instant, now: Instant) -> bool {
    now.saturating_duration_since(fetched_at) < self.retain_for
  }
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self::standard()
  }
}

/// Type-erased cached value.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// A fetch that any number of callers can await; it runs once.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Fetched, CacheError>>>;

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched from the network
  pub fetched_at: Instant,
  /// Background refresh started (or joined) by this read, if the data was stale
  pub refresh: Option<Refresh>,
}

impl<T> CacheResult<T> {
  pub(crate) fn from_network(data: T, fetched_at: Instant) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at,
      refresh: None,
    }
  }

  pub(crate) fn from_cache(data: T, fetched_at: Instant, refresh: Option<Refresh>) -> Self {
    Self {
      data,
      source: if refresh.is_some() {
        CacheSource::Stale
      } else {
        CacheSource::Fresh
      },
      fetched_at,
      refresh,
    }
  }

  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::Stale
  }

  /// Discard metadata and keep only the data.
  pub fn into_data(self) -> T {
    self.data
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the network by this read (or a read it was coalesced with)
  Network,
  /// Served from cache within the staleness window
  Fresh,
  /// Served from cache past the staleness window while a refresh runs
  Stale,
}

/// Out-of-band outcome of a background refresh.
///
/// Dropping the handle does not cancel the refresh.
#[derive(Clone)]
pub struct Refresh {
  pub(crate) fetch: SharedFetch,
}

impl Refresh {
  /// Wait for the refresh to finish.
  ///
  /// A failure is reported as [`CacheError::StaleServedWithBackgroundFailure`];
  /// the stale value stays in the cache either way.
  pub async fn outcome(self) -> Result<(), CacheError> {
    self
      .fetch
      .await
      .map(|_| ())
      .map_err(CacheError::into_background)
  }
}

impl std::fmt::Debug for Refresh {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Refresh").finish_non_exhaustive()
  }
}
