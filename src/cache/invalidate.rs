//! User-context driven eviction.

use std::fmt::Debug;
use std::sync::Mutex;

use super::layer::ResourceCache;
use super::traits::CacheKey;

/// Keys that may hold data belonging to a particular user.
pub trait UserScoped {
  type User: PartialEq + Clone + Debug + Send;

  /// The user this key structurally references, if any.
  fn user(&self) -> Option<&Self::User>;

  /// Whether the key belongs to a resource class that is always per-user,
  /// regardless of whether the key names one.
  fn is_user_scoped(&self) -> bool;
}

/// Evicts a user's cached data whenever the active user changes.
///
/// Without this, a new session could be served the previous user's financial
/// data out of the cache.
pub struct CacheInvalidator<K>
where
  K: CacheKey + UserScoped,
{
  cache: ResourceCache<K>,
  current: Mutex<Option<K::User>>,
}

impl<K> CacheInvalidator<K>
where
  K: CacheKey + UserScoped,
{
  pub fn new(cache: ResourceCache<K>, initial: Option<K::User>) -> Self {
    Self {
      cache,
      current: Mutex::new(initial),
    }
  }

  /// Remove every entry that references `user` or belongs to a user-scoped
  /// resource class.
  pub fn evict_user(&self, user: &K::User) -> usize {
    let removed = self
      .cache
      .invalidate(|key| key.is_user_scoped() || key.user() == Some(user));
    tracing::info!(?user, removed, "evicted user data from cache");
    removed
  }

  /// Record a user-context change (login, account swap, logout).
  ///
  /// Evicts exactly once per actual change; switching to the user that is
  /// already active does nothing. Returns whether an eviction happened.
  pub fn switch_user(&self, next: Option<K::User>) -> bool {
    let mut current = self
      .current
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    if *current == next {
      return false;
    }

    let previous = std::mem::replace(&mut *current, next);
    match &previous {
      Some(user) => {
        self.evict_user(user);
      }
      None => {
        let removed = self.cache.invalidate(|key| key.is_user_scoped());
        tracing::info!(removed, "evicted user-scoped data on login");
      }
    }
    true
  }

  /// The user whose data the cache is currently allowed to hold.
  pub fn current_user(&self) -> Option<K::User> {
    self
      .current
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .clone()
  }
}

impl<K> Debug for CacheInvalidator<K>
where
  K: CacheKey + UserScoped,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheInvalidator")
      .field("current", &self.current_user())
      .finish_non_exhaustive()
  }
}
