use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use url::Url;

use crate::billing::api_types::{
  ApiCashbackBalance, ApiCashbackTotal, ApiServiceStat, ApiSubscription, ApiTransactionsResponse,
  ApiUser,
};
use crate::billing::types::{LedgerPage, ServiceStat, SubscriptionRecord, UserId, UserSummary};
use crate::config::Config;

/// The remote billing endpoints the cache sits in front of.
///
/// Futures are `'static` so they can outlive the call that created them; the
/// cache spawns them to completion.
pub trait BillingApi: Send + Sync + 'static {
  fn subscriptions(&self, user: UserId) -> BoxFuture<'static, Result<Vec<SubscriptionRecord>>>;

  fn cashback_total(&self, user: UserId) -> BoxFuture<'static, Result<f64>>;

  fn cashback_balance(&self, user: UserId) -> BoxFuture<'static, Result<f64>>;

  fn transactions(
    &self,
    user: UserId,
    page: u32,
    page_size: u32,
  ) -> BoxFuture<'static, Result<LedgerPage>>;

  fn users(&self) -> BoxFuture<'static, Result<Vec<UserSummary>>>;

  fn service_stats(&self) -> BoxFuture<'static, Result<Vec<ServiceStat>>>;
}

/// Billing API client wrapper
#[derive(Clone)]
pub struct BillingClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl BillingClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_token(config.api.url.clone(), config.api.timeout, Config::get_api_token())
  }

  pub fn with_token(base: Url, timeout: Duration, token: Option<String>) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base, token })
  }

  /// Base URL the client talks to; also used to resolve relative asset locators.
  pub fn base_url(&self) -> &Url {
    &self.base
  }

  fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
    endpoint(&self.base, path, query)
  }

  /// GET an endpoint and decode its JSON body
  fn get_json<T>(&self, url: Result<Url>) -> BoxFuture<'static, Result<T>>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let http = self.http.clone();
    let token = self.token.clone();

    async move {
      let url = url?;
      tracing::debug!(%url, "GET");

      let mut request = http.get(url.clone());
      if let Some(token) = token {
        request = request.bearer_auth(token);
      }

      let response = request
        .send()
        .await
        .map_err(|e| eyre!("Request to {} failed: {}", url.path(), e))?;

      let status = response.status();
      if !status.is_success() {
        return Err(eyre!("Request to {} failed: HTTP {}", url.path(), status));
      }

      response
        .json::<T>()
        .await
        .map_err(|e| eyre!("Failed to parse response from {}: {}", url.path(), e))
    }
    .boxed()
  }
}

/// Build an endpoint URL under `base` with the given query parameters
fn endpoint(base: &Url, path: &str, query: &[(&str, String)]) -> Result<Url> {
  let mut url = base
    .join(path)
    .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))?;
  if !query.is_empty() {
    url.query_pairs_mut().extend_pairs(query);
  }
  Ok(url)
}

fn user_query(user: UserId) -> Vec<(&'static str, String)> {
  vec![("userId", user.to_string())]
}

impl BillingApi for BillingClient {
  /// Get all subscriptions of a user
  fn subscriptions(&self, user: UserId) -> BoxFuture<'static, Result<Vec<SubscriptionRecord>>> {
    let response = self.get_json::<Vec<ApiSubscription>>(
      self.endpoint("/api/subscriptions", &user_query(user)),
    );

    async move {
      response
        .await?
        .into_iter()
        .map(ApiSubscription::into_record)
        .collect()
    }
    .boxed()
  }

  fn cashback_total(&self, user: UserId) -> BoxFuture<'static, Result<f64>> {
    let response = self.get_json::<ApiCashbackTotal>(
      self.endpoint("/api/cashback/total", &user_query(user)),
    );
    async move { Ok(response.await?.total) }.boxed()
  }

  fn cashback_balance(&self, user: UserId) -> BoxFuture<'static, Result<f64>> {
    let response = self.get_json::<ApiCashbackBalance>(
      self.endpoint("/api/cashback/balance", &user_query(user)),
    );
    async move { Ok(response.await?.balance) }.boxed()
  }

  /// Get one page of a user's cashback transactions
  fn transactions(
    &self,
    user: UserId,
    page: u32,
    page_size: u32,
  ) -> BoxFuture<'static, Result<LedgerPage>> {
    let mut query = user_query(user);
    query.push(("page", page.to_string()));
    query.push(("limit", page_size.to_string()));
    let response =
      self.get_json::<ApiTransactionsResponse>(self.endpoint("/api/cashback/transactions", &query));

    async move {
      let response = response.await?;
      Ok(LedgerPage {
        items: response.items.into_iter().map(Into::into).collect(),
        total: response.total,
        page,
        page_size,
      })
    }
    .boxed()
  }

  fn users(&self) -> BoxFuture<'static, Result<Vec<UserSummary>>> {
    let response = self.get_json::<Vec<ApiUser>>(self.endpoint("/api/users", &[]));
    async move { Ok(response.await?.into_iter().map(Into::into).collect()) }.boxed()
  }

  fn service_stats(&self) -> BoxFuture<'static, Result<Vec<ServiceStat>>> {
    let response = self.get_json::<Vec<ApiServiceStat>>(self.endpoint("/api/stats/services", &[]));
    async move { Ok(response.await?.into_iter().map(Into::into).collect()) }.boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base() -> Url {
    Url::parse("https://cashback.example.com").unwrap()
  }

  #[test]
  fn test_endpoint_with_query() {
    let mut query = user_query(UserId(7));
    query.push(("page", "2".to_string()));

    let url = endpoint(&base(), "/api/cashback/transactions", &query).unwrap();
    assert_eq!(
      url.as_str(),
      "https://cashback.example.com/api/cashback/transactions?userId=7&page=2"
    );
  }

  #[test]
  fn test_endpoint_without_query() {
    let url = endpoint(&base(), "/api/stats/services", &[]).unwrap();
    assert_eq!(url.as_str(), "https://cashback.example.com/api/stats/services");
  }
}
