use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{ApiDataset, ApiDatasetSummary};
use super::types::{DatasetSummary, VersionedDataset};

/// Build the HTTP client shared by dataset fetches and shell mirroring.
///
/// The timeout bounds every suspension on the network; without it a dead
/// connection would hang a load tier indefinitely.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
  reqwest::Client::builder()
    .timeout(timeout)
    .build()
    .map_err(|e| eyre!("Failed to create HTTP client: {}", e))
}

/// Client for the remote dataset resource.
#[derive(Clone)]
pub struct DatasetClient {
  http: reqwest::Client,
  url: Url,
}

impl DatasetClient {
  pub fn new(url: Url, http: reqwest::Client) -> Self {
    Self { http, url }
  }

  /// Fetch and parse the full dataset document.
  pub async fn fetch_dataset(&self) -> Result<VersionedDataset> {
    debug!("Fetching dataset from {}", self.url);
    let body = self.get_text(self.url.clone()).await?;
    let api: ApiDataset = serde_json::from_str(&body)
      .map_err(|e| eyre!("Failed to parse dataset document: {}", e))?;
    api.into_dataset(Utc::now())
  }

  /// Fetch only the dataset summary for an update check.
  ///
  /// The request carries a cache-busting query parameter so intermediate
  /// caches cannot mask a new release.
  pub async fn fetch_summary(&self) -> Result<DatasetSummary> {
    let url = cache_busted(&self.url, Utc::now().timestamp_millis());
    debug!("Checking dataset version at {}", url);
    let body = self.get_text(url).await?;
    let api: ApiDatasetSummary = serde_json::from_str(&body)
      .map_err(|e| eyre!("Failed to parse dataset document: {}", e))?;
    api.into_summary()
  }

  async fn get_text(&self, url: Url) -> Result<String> {
    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(eyre!("Request to {} returned {}", url, status));
    }

    response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))
  }
}

/// A raw asset response, before the cache decides its fate.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
  pub body: Vec<u8>,
  pub content_type: Option<String>,
  pub status: u16,
  /// URL the response actually came from, after redirects.
  pub final_url: Url,
}

/// Fetch one shell asset relative to the origin.
///
/// Non-2xx responses are returned as-is rather than as errors; the asset
/// cache treats them differently from a dead network. Arguments are owned so
/// callers can move clones into retry or fan-out closures.
pub async fn fetch_asset(http: reqwest::Client, origin: Url, path: String) -> Result<FetchedAsset> {
  let url = origin
    .join(&path)
    .map_err(|e| eyre!("Failed to resolve asset URL '{}': {}", path, e))?;
  debug!("Fetching asset {}", url);

  let response = http
    .get(url.clone())
    .send()
    .await
    .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

  let status = response.status().as_u16();
  let final_url = response.url().clone();
  let content_type = response
    .headers()
    .get(reqwest::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from);
  let body = response
    .bytes()
    .await
    .map_err(|e| eyre!("Failed to read {}: {}", url, e))?
    .to_vec();

  Ok(FetchedAsset {
    body,
    content_type,
    status,
    final_url,
  })
}

/// Append a `t=<epoch-millis>` pair without disturbing any existing query.
fn cache_busted(url: &Url, stamp: i64) -> Url {
  let mut busted = url.clone();
  busted
    .query_pairs_mut()
    .append_pair("t", &stamp.to_string());
  busted
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cache_buster_appends_timestamp() {
    let url = Url::parse("https://example.net/wisdom-data.json").unwrap();
    let busted = cache_busted(&url, 1_700_000_000_000);
    assert_eq!(
      busted.as_str(),
      "https://example.net/wisdom-data.json?t=1700000000000"
    );
  }

  #[test]
  fn test_cache_buster_keeps_existing_query() {
    let url = Url::parse("https://example.net/data.json?lang=en").unwrap();
    let busted = cache_busted(&url, 7);
    assert_eq!(busted.as_str(), "https://example.net/data.json?lang=en&t=7");
  }
}
