//! Error taxonomy for the cache layer.

use std::sync::Arc;

use color_eyre::Report;

/// Failures surfaced by the resource and asset caches.
///
/// The type is `Clone` because a single fetch outcome is handed to every
/// caller that was coalesced onto it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
  /// The remote fetch failed and no cached value could stand in for it.
  #[error("failed to fetch {key}: {report}")]
  FetchFailure { key: String, report: Arc<Report> },

  /// A background refresh failed; the caller was already served a stale value.
  #[error("refresh of {key} failed, stale value kept: {report}")]
  StaleServedWithBackgroundFailure { key: String, report: Arc<Report> },

  /// An asset could not be verified as loadable. Never cached.
  #[error("failed to load asset {locator}: {report}")]
  LoadVerificationFailure { locator: String, report: Arc<Report> },

  /// The value cached under a key has a different type than the caller asked for.
  #[error("cached value for {key} is not a {expected}")]
  TypeMismatch { key: String, expected: &'static str },
}

impl CacheError {
  pub(crate) fn fetch(key: impl Into<String>, report: Report) -> Self {
    Self::FetchFailure {
      key: key.into(),
      report: Arc::new(report),
    }
  }

  pub(crate) fn load(locator: impl Into<String>, report: Report) -> Self {
    Self::LoadVerificationFailure {
      locator: locator.into(),
      report: Arc::new(report),
    }
  }

  /// Re-tag a fetch failure as one that happened behind a stale value.
  pub(crate) fn into_background(self) -> Self {
    match self {
      Self::FetchFailure { key, report } => Self::StaleServedWithBackgroundFailure { key, report },
      other => other,
    }
  }

  /// Whether a later access may succeed. Everything but a type mismatch is
  /// transient.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, Self::TypeMismatch { .. })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  #[test]
  fn test_into_background_retags_fetch_failure() {
    let err = CacheError::fetch("subscriptions", eyre!("connection reset")).into_background();
    assert!(matches!(
      err,
      CacheError::StaleServedWithBackgroundFailure { ref key, .. } if key == "subscriptions"
    ));
    assert!(err.to_string().contains("connection reset"));
  }

  #[test]
  fn test_type_mismatch_is_not_retryable() {
    let err = CacheError::TypeMismatch {
      key: "k".to_string(),
      expected: "u32",
    };
    assert!(!err.is_retryable());
    assert!(CacheError::load("/icon.png", eyre!("404")).is_retryable());
  }
}
