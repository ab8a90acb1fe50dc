//! Cache layer that orchestrates caching logic with network fetching.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use color_eyre::Result;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::time::Instant;

use super::error::CacheError;
use super::storage::{Fetched, Lookup, MemoryStorage};
use super::traits::{AnyValue, CacheKey, CachePolicy, CacheResult, Refresh, SharedFetch};

/// Read-through cache for remote resources.
///
/// - Fresh values are served without fetching
/// - Stale values are served immediately while a background refresh runs
/// - Concurrent reads of a missing key share a single fetch
/// - Values past their retention window are never served
///
/// Values of any type can be stored; each key is expected to always hold the
/// same type. Clones share the same entries.
pub struct ResourceCache<K: CacheKey> {
  state: Arc<Mutex<MemoryStorage<K>>>,
}

impl<K: CacheKey> ResourceCache<K> {
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(MemoryStorage::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, MemoryStorage<K>> {
    lock(&self.state)
  }

  /// Fetch a value with cache-first strategy.
  ///
  /// 1. Fresh entry: return it, `fetcher` is not called
  /// 2. Stale entry: return it and refresh in the background
  /// 3. Missing (or purged) entry: join the in-flight fetch or start one
  ///
  /// A failed fetch with nothing cached is returned to every coalesced caller
  /// and leaves the cache untouched.
  pub async fn get<V, F, Fut>(
    &self,
    key: K,
    policy: CachePolicy,
    fetcher: F,
  ) -> Result<CacheResult<V>, CacheError>
  where
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    let fetch = {
      let mut state = self.lock();
      match state.lookup(&key, &policy, Instant::now()) {
        Lookup::Fresh(entry) => {
          tracing::debug!(key = %key.description(), "cache hit");
          let data = downcast(&key, entry.value)?;
          return Ok(CacheResult::from_cache(data, entry.fetched_at, None));
        }
        Lookup::Stale(entry) => {
          let fetch = match state.in_flight(&key) {
            Some(fetch) => fetch,
            None => {
              tracing::debug!(key = %key.description(), "serving stale entry, refreshing");
              self.start(&mut state, key.clone(), policy, fetcher)
            }
          };
          let data = downcast(&key, entry.value)?;
          return Ok(CacheResult::from_cache(
            data,
            entry.fetched_at,
            Some(Refresh { fetch }),
          ));
        }
        Lookup::Miss => match state.in_flight(&key) {
          Some(fetch) => {
            tracing::debug!(key = %key.description(), "joining in-flight fetch");
            fetch
          }
          None => {
            tracing::debug!(key = %key.description(), "cache miss");
            self.start(&mut state, key.clone(), policy, fetcher)
          }
        },
      }
    };

    let fetched = fetch.await?;
    let data = downcast(&key, fetched.value)?;
    Ok(CacheResult::from_network(data, fetched.fetched_at))
  }

  /// Force a fetch regardless of what is cached.
  ///
  /// Any fetch already in flight for `key` is superseded: it still resolves
  /// for the callers waiting on it, but its result is not stored.
  pub async fn refetch<V, F, Fut>(
    &self,
    key: K,
    policy: CachePolicy,
    fetcher: F,
  ) -> Result<CacheResult<V>, CacheError>
  where
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    let fetch = {
      let mut state = self.lock();
      self.start(&mut state, key.clone(), policy, fetcher)
    };

    let fetched = fetch.await?;
    let data = downcast(&key, fetched.value)?;
    Ok(CacheResult::from_network(data, fetched.fetched_at))
  }

  /// Warm an entry ahead of use without waiting for it.
  ///
  /// Does nothing if the entry is fresh, a fetch is already in flight, or
  /// there is no tokio runtime to run the fetch on. Returns a handle to the
  /// started fetch otherwise.
  pub fn prefetch<V, F, Fut>(&self, key: K, policy: CachePolicy, fetcher: F) -> Option<Refresh>
  where
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    if Handle::try_current().is_err() {
      tracing::warn!(key = %key.description(), "no tokio runtime, skipping prefetch");
      return None;
    }

    let mut state = self.lock();
    if state.in_flight(&key).is_some() {
      return None;
    }
    if let Lookup::Fresh(_) = state.lookup(&key, &policy, Instant::now()) {
      return None;
    }

    tracing::debug!(key = %key.description(), "prefetching");
    let fetch = self.start(&mut state, key, policy, fetcher);
    Some(Refresh { fetch })
  }

  /// Get the cached value for `key` without fetching, if it is still retained.
  pub fn peek<V>(&self, key: &K) -> Option<V>
  where
    V: Clone + Send + Sync + 'static,
  {
    let state = self.lock();
    let entry = state.peek(key, Instant::now())?;
    downcast(key, entry.value.clone()).ok()
  }

  /// Remove every entry whose key matches `predicate`.
  ///
  /// Fetches in flight for matching keys keep running for whoever awaits
  /// them, but their results are discarded. Returns the number of entries
  /// removed.
  pub fn invalidate<P>(&self, predicate: P) -> usize
  where
    P: Fn(&K) -> bool,
  {
    let removed = self.lock().remove_matching(predicate);
    tracing::debug!(removed, "invalidated cache entries");
    removed
  }

  /// Drop every entry past its retention window.
  pub fn purge_expired(&self) -> usize {
    self.lock().purge_expired(Instant::now())
  }

  /// Number of stored entries (including stale ones not yet purged).
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Start a fetch for `key` and register it as the current one.
  ///
  /// On a tokio runtime the fetch is spawned so it completes even if every
  /// caller awaiting it goes away. Elsewhere it runs when first awaited.
  /// Only the current generation for a key may write its entry.
  fn start<V, F, Fut>(
    &self,
    state: &mut MemoryStorage<K>,
    key: K,
    policy: CachePolicy,
    fetcher: F,
  ) -> SharedFetch
  where
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
  {
    let generation = state.next_generation();
    let shared_state = Arc::clone(&self.state);
    let task_key = key.clone();

    let fetch = async move {
      let result = match fetcher().await {
        Ok(value) => Ok(Fetched {
          value: Arc::new(value) as AnyValue,
          fetched_at: Instant::now(),
        }),
        Err(e) => Err(CacheError::fetch(task_key.description(), e)),
      };

      if let Err(e) = &result {
        tracing::warn!(key = %task_key.description(), error = %e, "fetch failed");
      }

      let stored =
        lock(&shared_state).complete(&task_key, generation, &result, policy, Instant::now());
      if !stored {
        tracing::debug!(
          key = %task_key.description(),
          generation,
          "discarding response of superseded fetch"
        );
      }
      result
    }
    .boxed()
    .shared();

    state.begin(key, generation, fetch.clone());
    if let Ok(runtime) = Handle::try_current() {
      runtime.spawn(fetch.clone());
    }
    fetch
  }
}

impl<K: CacheKey> Default for ResourceCache<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: CacheKey> Clone for ResourceCache<K> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<K: CacheKey> std::fmt::Debug for ResourceCache<K> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.lock();
    f.debug_struct("ResourceCache")
      .field("entries", &state.len())
      .field("in_flight", &state.in_flight_count())
      .finish()
  }
}

/// Cache bookkeeping never leaves the state half-written, so a poisoned lock
/// is still safe to use.
fn lock<K>(state: &Mutex<MemoryStorage<K>>) -> MutexGuard<'_, MemoryStorage<K>> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn downcast<K: CacheKey, V>(key: &K, value: AnyValue) -> Result<V, CacheError>
where
  V: Clone + Send + Sync + 'static,
{
  value
    .downcast::<V>()
    .map(|v| (*v).clone())
    .map_err(|_| CacheError::TypeMismatch {
      key: key.description(),
      expected: std::any::type_name::<V>(),
    })
}
