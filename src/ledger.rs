//! Paged view over a user's cashback transactions.
//!
//! Each page is requested and cached on its own; pages are never merged.

use crate::billing::cached_client::CachedBillingClient;
use crate::billing::types::{LedgerPage, UserId};
use crate::cache::CacheError;

/// Number of pages needed for `total` items, never less than one.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
  let page_size = u64::from(page_size.max(1));
  let pages = total.div_ceil(page_size).max(1);
  u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Clamp a requested page number into `1..=total_pages(total, page_size)`.
pub fn clamp_page(requested: i64, total: u64, page_size: u32) -> u32 {
  let last = total_pages(total, page_size);
  let clamped = requested.clamp(1, i64::from(last));
  u32::try_from(clamped).unwrap_or(last)
}

/// Cursor over the ledger of one user.
///
/// Navigation clamps against the last total the server reported, so a
/// request never targets a page known not to exist.
#[derive(Debug, Clone)]
pub struct LedgerView {
  client: CachedBillingClient,
  user: UserId,
  page_size: u32,
  current: u32,
  total: Option<u64>,
}

impl LedgerView {
  pub fn new(client: CachedBillingClient, user: UserId, page_size: u32) -> Self {
    Self {
      client,
      user,
      page_size: page_size.max(1),
      current: 1,
      total: None,
    }
  }

  pub fn current_page(&self) -> u32 {
    self.current
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  /// Total transaction count as last reported, if any page was loaded.
  pub fn total(&self) -> Option<u64> {
    self.total
  }

  /// Page count as of the last load (one until then).
  pub fn total_pages(&self) -> u32 {
    total_pages(self.total.unwrap_or(0), self.page_size)
  }

  /// Load page `requested`, clamped into `1..=total_pages`.
  ///
  /// Until a total is known, page 1 is loaded first to learn it, so the
  /// server is never asked for a page outside the range it reported.
  pub async fn page(&mut self, requested: i64) -> Result<LedgerPage, CacheError> {
    let total = match self.total {
      Some(total) => total,
      None => {
        let first = self.load(1).await?;
        if requested <= 1 {
          return Ok(first);
        }
        first.total
      }
    };

    let number = clamp_page(requested, total, self.page_size);
    self.load(number).await
  }

  pub async fn first(&mut self) -> Result<LedgerPage, CacheError> {
    self.page(1).await
  }

  pub async fn last(&mut self) -> Result<LedgerPage, CacheError> {
    self.page(i64::MAX).await
  }

  pub async fn next(&mut self) -> Result<LedgerPage, CacheError> {
    self.page(i64::from(self.current) + 1).await
  }

  pub async fn prev(&mut self) -> Result<LedgerPage, CacheError> {
    self.page(i64::from(self.current) - 1).await
  }

  pub async fn goto(&mut self, page: i64) -> Result<LedgerPage, CacheError> {
    self.page(page).await
  }

  async fn load(&mut self, number: u32) -> Result<LedgerPage, CacheError> {
    let page = self
      .client
      .transactions_page(self.user, number, self.page_size)
      .await?
      .into_data();

    self.current = number;
    self.total = Some(page.total);
    Ok(page)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use chrono::Utc;
  use color_eyre::{eyre::eyre, Result};
  use futures::future::BoxFuture;
  use futures::FutureExt;

  use super::*;
  use crate::billing::client::BillingApi;
  use crate::billing::types::{CashbackTransaction, ServiceStat, SubscriptionRecord, UserSummary};
  use crate::cache::AssetLoader;
  use crate::config::CacheConfig;

  /// Serves a fixed-size ledger, recording every page asked for and
  /// rejecting pages past the end.
  struct LedgerApi {
    total: u64,
    requested: Arc<Mutex<Vec<u32>>>,
  }

  impl BillingApi for LedgerApi {
    fn subscriptions(&self, _user: UserId) -> BoxFuture<'static, Result<Vec<SubscriptionRecord>>> {
      async { Ok(Vec::new()) }.boxed()
    }

    fn cashback_total(&self, _user: UserId) -> BoxFuture<'static, Result<f64>> {
      async { Ok(0.0) }.boxed()
    }

    fn cashback_balance(&self, _user: UserId) -> BoxFuture<'static, Result<f64>> {
      async { Ok(0.0) }.boxed()
    }

    fn transactions(
      &self,
      user: UserId,
      page: u32,
      page_size: u32,
    ) -> BoxFuture<'static, Result<LedgerPage>> {
      self.requested.lock().unwrap().push(page);
      let total = self.total;
      if page == 0 || page > total_pages(total, page_size) {
        return async move { Err(eyre!("page {} out of range", page)) }.boxed();
      }

      let start = u64::from(page - 1) * u64::from(page_size);
      let items = (start..total.min(start + u64::from(page_size)))
        .map(|id| CashbackTransaction {
          id,
          user_id: user,
          amount: 5.0,
          description: "Cashback".to_string(),
          created_at: Utc::now(),
        })
        .collect();

      async move {
        Ok(LedgerPage {
          items,
          total,
          page,
          page_size,
        })
      }
      .boxed()
    }

    fn users(&self) -> BoxFuture<'static, Result<Vec<UserSummary>>> {
      async { Ok(Vec::new()) }.boxed()
    }

    fn service_stats(&self) -> BoxFuture<'static, Result<Vec<ServiceStat>>> {
      async { Ok(Vec::new()) }.boxed()
    }
  }

  struct NoAssets;

  impl AssetLoader for NoAssets {
    fn verify(&self, _locator: &str) -> BoxFuture<'static, Result<()>> {
      async { Ok(()) }.boxed()
    }
  }

  fn view(total: u64, page_size: u32) -> (LedgerView, Arc<Mutex<Vec<u32>>>) {
    let requested = Arc::new(Mutex::new(Vec::new()));
    let api = LedgerApi {
      total,
      requested: Arc::clone(&requested),
    };
    let client = CachedBillingClient::with_parts(api, NoAssets, CacheConfig::default(), None);
    (LedgerView::new(client, UserId(1), page_size), requested)
  }

  #[test]
  fn test_total_pages() {
    assert_eq!(total_pages(0, 10), 1);
    assert_eq!(total_pages(10, 10), 1);
    assert_eq!(total_pages(11, 10), 2);
    assert_eq!(total_pages(23, 10), 3);
    assert_eq!(total_pages(5, 0), 5);
  }

  #[test]
  fn test_clamp_page() {
    assert_eq!(clamp_page(0, 23, 10), 1);
    assert_eq!(clamp_page(-4, 23, 10), 1);
    assert_eq!(clamp_page(2, 23, 10), 2);
    assert_eq!(clamp_page(9, 23, 10), 3);
    assert_eq!(clamp_page(3, 0, 10), 1);
  }

  #[tokio::test]
  async fn test_navigation_stays_in_range() {
    let (mut view, requested) = view(23, 10);

    let page = view.first().await.unwrap();
    assert_eq!(page.items.len(), 10);
    assert_eq!(view.total_pages(), 3);

    view.prev().await.unwrap();
    assert_eq!(view.current_page(), 1);

    view.goto(3).await.unwrap();
    let page = view.next().await.unwrap();
    assert_eq!(view.current_page(), 3);
    assert_eq!(page.items.len(), 3);
    assert_eq!(*requested.lock().unwrap(), vec![1, 3]);
  }

  #[tokio::test]
  async fn test_request_past_unknown_end_only_asks_for_existing_pages() {
    let (mut view, requested) = view(23, 10);

    let page = view.goto(7).await.unwrap();

    assert_eq!(page.page, 3);
    assert_eq!(page.items.len(), 3);
    assert_eq!(view.current_page(), 3);
    assert_eq!(view.total(), Some(23));
    assert_eq!(*requested.lock().unwrap(), vec![1, 3]);
  }

  #[tokio::test]
  async fn test_last_learns_total_first() {
    let (mut view, requested) = view(23, 10);

    let page = view.last().await.unwrap();

    assert_eq!(page.page, 3);
    assert_eq!(*requested.lock().unwrap(), vec![1, 3]);
  }

  #[tokio::test]
  async fn test_empty_ledger_has_one_page() {
    let (mut view, requested) = view(0, 10);

    let page = view.last().await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.page, 1);
    assert_eq!(view.total_pages(), 1);
    assert_eq!(*requested.lock().unwrap(), vec![1]);
  }
}
