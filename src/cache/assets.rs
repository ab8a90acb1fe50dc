//! Verified cache for icon and image locators.
//!
//! A locator is only reported ready once it has actually been loaded. Failed
//! loads are never remembered, so the next resolve tries again. Entries live
//! for as long as the cache does.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::runtime::Handle;
use url::Url;

use super::error::CacheError;

/// Something that can check whether a locator points at a loadable asset.
pub trait AssetLoader: Send + Sync + 'static {
  /// Load the asset behind `locator`, failing if it cannot be displayed.
  fn verify(&self, locator: &str) -> BoxFuture<'static, Result<()>>;
}

/// Loads assets over HTTP, resolving relative locators against a base URL.
#[derive(Clone)]
pub struct HttpAssetLoader {
  client: reqwest::Client,
  base: Url,
}

impl HttpAssetLoader {
  pub fn new(base: Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create asset HTTP client: {}", e))?;
    Ok(Self { client, base })
  }
}

/// Resolve a possibly relative locator against the API base URL.
fn resolve_locator(base: &Url, locator: &str) -> Result<Url> {
  base
    .join(locator)
    .map_err(|e| eyre!("Invalid asset locator {}: {}", locator, e))
}

impl AssetLoader for HttpAssetLoader {
  fn verify(&self, locator: &str) -> BoxFuture<'static, Result<()>> {
    let client = self.client.clone();
    let url = resolve_locator(&self.base, locator);

    async move {
      let url = url?;
      let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", url, e))?;

      let status = response.status();
      if !status.is_success() {
        return Err(eyre!("Failed to load {}: HTTP {}", url, status));
      }

      let is_image = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("image/"));
      if !is_image {
        return Err(eyre!("{} is not an image", url));
      }

      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read {}: {}", url, e))?;
      if body.is_empty() {
        return Err(eyre!("{} returned an empty body", url));
      }

      Ok(())
    }
    .boxed()
  }
}

/// The state of an asset resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
  /// A verification load is in progress
  Loading,
  /// Safe to render; `None` means there is nothing to load and a placeholder should be shown
  Ready(Option<String>),
  /// The asset could not be loaded
  Error(String),
}

impl AssetStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, AssetStatus::Loading)
  }

  pub fn is_ready(&self) -> bool {
    matches!(self, AssetStatus::Ready(_))
  }

  pub fn handle(&self) -> Option<&str> {
    match self {
      AssetStatus::Ready(handle) => handle.as_deref(),
      _ => None,
    }
  }
}

type SharedLoad = Shared<BoxFuture<'static, Result<String, CacheError>>>;

#[derive(Default)]
struct AssetState {
  ready: HashSet<String>,
  loading: HashMap<String, SharedLoad>,
}

/// Cache of locators that have been verified loadable.
pub struct AssetCache {
  loader: Arc<dyn AssetLoader>,
  state: Arc<Mutex<AssetState>>,
}

impl AssetCache {
  pub fn new(loader: impl AssetLoader) -> Self {
    Self {
      loader: Arc::new(loader),
      state: Arc::default(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, AssetState> {
    lock(&self.state)
  }

  /// Resolve a locator.
  ///
  /// Returns immediately. A missing or blank locator and a cache hit are
  /// `Ready` right away; a miss starts (or joins) a background load and is
  /// `Loading` until the returned request is polled or settled. A miss with
  /// no tokio runtime to load on is an `Error` and is not remembered.
  pub fn resolve(&self, locator: Option<&str>) -> AssetRequest {
    let Some(locator) = locator.map(str::trim).filter(|l| !l.is_empty()) else {
      return AssetRequest::settled(AssetStatus::Ready(None));
    };

    let mut state = self.lock();
    if state.ready.contains(locator) {
      return AssetRequest::settled(AssetStatus::Ready(Some(locator.to_string())));
    }

    let load = match state.loading.get(locator) {
      Some(load) => {
        tracing::debug!(locator, "joining in-flight asset load");
        load.clone()
      }
      None => {
        let Ok(runtime) = Handle::try_current() else {
          tracing::warn!(locator, "no tokio runtime, cannot load asset");
          let error = CacheError::load(locator, eyre!("no tokio runtime to load on"));
          return AssetRequest::settled(AssetStatus::Error(error.to_string()));
        };
        let load = self.start(locator.to_string(), &runtime);
        state.loading.insert(locator.to_string(), load.clone());
        load
      }
    };

    AssetRequest {
      status: AssetStatus::Loading,
      pending: Some(load),
    }
  }

  /// Whether `locator` has already been verified.
  pub fn contains(&self, locator: &str) -> bool {
    self.lock().ready.contains(locator)
  }

  pub fn len(&self) -> usize {
    self.lock().ready.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn start(&self, locator: String, runtime: &Handle) -> SharedLoad {
    let shared = Arc::clone(&self.state);
    let verify = self.loader.verify(&locator);

    let load = async move {
      let result = verify.await;
      let mut state = lock(&shared);
      state.loading.remove(&locator);
      match result {
        Ok(()) => {
          state.ready.insert(locator.clone());
          Ok(locator)
        }
        Err(e) => {
          tracing::warn!(locator = %locator, error = %e, "asset failed to load");
          Err(CacheError::load(locator, e))
        }
      }
    }
    .boxed()
    .shared();

    runtime.spawn(load.clone());
    load
  }
}

impl Clone for AssetCache {
  fn clone(&self) -> Self {
    Self {
      loader: Arc::clone(&self.loader),
      state: Arc::clone(&self.state),
    }
  }
}

impl std::fmt::Debug for AssetCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.lock();
    f.debug_struct("AssetCache")
      .field("ready", &state.ready.len())
      .field("loading", &state.loading.len())
      .finish_non_exhaustive()
  }
}

fn lock(state: &Mutex<AssetState>) -> MutexGuard<'_, AssetState> {
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One caller's view of an asset resolution.
pub struct AssetRequest {
  status: AssetStatus,
  pending: Option<SharedLoad>,
}

impl std::fmt::Debug for AssetRequest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AssetRequest")
      .field("status", &self.status)
      .field("pending", &self.pending.is_some())
      .finish()
  }
}

impl AssetRequest {
  fn settled(status: AssetStatus) -> Self {
    Self {
      status,
      pending: None,
    }
  }

  pub fn status(&self) -> &AssetStatus {
    &self.status
  }

  /// Check for a finished load without blocking.
  ///
  /// Returns `true` if the status changed.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = &self.pending else {
      return false;
    };

    match pending.clone().now_or_never() {
      Some(result) => {
        self.finish(result);
        true
      }
      None => false,
    }
  }

  /// Wait for the load to finish and return the final status.
  pub async fn settle(mut self) -> AssetStatus {
    if let Some(pending) = self.pending.take() {
      let result = pending.await;
      self.finish(result);
    }
    self.status
  }

  fn finish(&mut self, result: Result<String, CacheError>) {
    self.pending = None;
    self.status = match result {
      Ok(locator) => AssetStatus::Ready(Some(locator)),
      Err(e) => AssetStatus::Error(e.to_string()),
    };
  }
}
