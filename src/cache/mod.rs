//! In-memory caching layer for remote resources and image assets.
//!
//! This module is independent of the billing API and provides:
//! - A read-through resource cache with staleness and retention windows
//! - Request coalescing so concurrent reads of a key share one fetch
//! - Generation-tagged fetches so superseded responses are never stored
//! - A verified asset cache that never remembers failed loads
//! - User-context eviction of per-user entries

mod assets;
mod error;
mod invalidate;
mod layer;
mod storage;
mod traits;

pub use assets::{AssetCache, AssetLoader, AssetRequest, AssetStatus, HttpAssetLoader};
pub use error::CacheError;
pub use invalidate::{CacheInvalidator, UserScoped};
pub use layer::ResourceCache;
pub use traits::{CacheKey, CachePolicy, CacheResult, CacheSource, Refresh};
