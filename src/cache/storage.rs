//! In-memory entry storage for the resource cache.
//!
//! Holds the last successful value per key plus the fetch currently in flight
//! for it. Nothing here awaits; callers hold the surrounding lock only for the
//! duration of a single method call.

use std::collections::HashMap;

use tokio::time::Instant;

use super::traits::{AnyValue, CacheKey, CachePolicy, SharedFetch};

/// A successful fetch result, as handed to every coalesced caller.
#[derive(Clone)]
pub(crate) struct Fetched {
  pub value: AnyValue,
  pub fetched_at: Instant,
}

/// A single cached value.
#[derive(Clone)]
pub(crate) struct StoredEntry {
  pub value: AnyValue,
  pub fetched_at: Instant,
  /// Policy the value was stored with; its retention window governs purging
  pub policy: CachePolicy,
}

/// The fetch currently allowed to write a key.
struct InFlight {
  generation: u64,
  fetch: SharedFetch,
}

/// Outcome of looking a key up against a staleness window.
pub(crate) enum Lookup {
  Fresh(StoredEntry),
  Stale(StoredEntry),
  Miss,
}

pub(crate) struct MemoryStorage<K> {
  entries: HashMap<K, StoredEntry>,
  in_flight: HashMap<K, InFlight>,
  next_generation: u64,
}

impl<K: CacheKey> MemoryStorage<K> {
  pub fn new() -> Self {
    Self {
      entries: HashMap::new(),
      in_flight: HashMap::new(),
      next_generation: 0,
    }
  }

  /// Look a key up, purging it first if it is past its retention window.
  pub fn lookup(&mut self, key: &K, policy: &CachePolicy, now: Instant) -> Lookup {
    let Some(entry) = self.entries.get(key).cloned() else {
      return Lookup::Miss;
    };

    if !entry.policy.is_retained(entry.fetched_at, now) {
      tracing::debug!(key = %key.description(), "purging entry past retention");
      self.entries.remove(key);
      return Lookup::Miss;
    }

    if policy.is_fresh(entry.fetched_at, now) {
      Lookup::Fresh(entry)
    } else {
      Lookup::Stale(entry)
    }
  }

  /// Get a retained value without any freshness check.
  pub fn peek(&self, key: &K, now: Instant) -> Option<&StoredEntry> {
    self
      .entries
      .get(key)
      .filter(|e| e.policy.is_retained(e.fetched_at, now))
  }

  pub fn in_flight(&self, key: &K) -> Option<SharedFetch> {
    self.in_flight.get(key).map(|f| f.fetch.clone())
  }

  /// Reserve a generation for a fetch that is about to start.
  pub fn next_generation(&mut self) -> u64 {
    self.next_generation += 1;
    self.next_generation
  }

  /// Register `fetch` as the one allowed to write `key`, superseding any other.
  pub fn begin(&mut self, key: K, generation: u64, fetch: SharedFetch) {
    self.in_flight.insert(key, InFlight { generation, fetch });
  }

  /// Record the outcome of a fetch.
  ///
  /// Returns `false` without touching anything if the fetch is no longer the
  /// current one for its key (invalidated or superseded). A successful write
  /// also sweeps every other entry past its retention window.
  pub fn complete(
    &mut self,
    key: &K,
    generation: u64,
    result: &Result<Fetched, super::CacheError>,
    policy: CachePolicy,
    now: Instant,
  ) -> bool {
    match self.in_flight.get(key) {
      Some(current) if current.generation == generation => {}
      _ => return false,
    }
    self.in_flight.remove(key);

    if let Ok(fetched) = result {
      let purged = self.purge_expired(now);
      if purged > 0 {
        tracing::debug!(purged, "swept expired entries");
      }
      self.entries.insert(
        key.clone(),
        StoredEntry {
          value: fetched.value.clone(),
          fetched_at: fetched.fetched_at,
          policy,
        },
      );
    }
    true
  }

  /// Drop every entry and in-flight marker whose key matches.
  ///
  /// Returns the number of entries removed.
  pub fn remove_matching<P>(&mut self, predicate: P) -> usize
  where
    P: Fn(&K) -> bool,
  {
    let before = self.entries.len();
    self.entries.retain(|k, _| !predicate(k));
    self.in_flight.retain(|k, _| !predicate(k));
    before - self.entries.len()
  }

  /// Drop every entry past its retention window.
  pub fn purge_expired(&mut self, now: Instant) -> usize {
    let before = self.entries.len();
    self
      .entries
      .retain(|_, e| e.policy.is_retained(e.fetched_at, now));
    before - self.entries.len()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn in_flight_count(&self) -> usize {
    self.in_flight.len()
  }
}
