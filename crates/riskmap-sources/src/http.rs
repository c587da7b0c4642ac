//! Shared HTTP client with a per-request timeout and bounded retries.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::{Error, Result, config::HttpConfig};

/// Fetches pages for every adapter.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpFetcher {
  client:  Client,
  retries: u32,
  backoff: Duration,
}

impl HttpFetcher {
  pub fn new(config: &HttpConfig) -> Result<Self> {
    let mut builder = Client::builder()
      .timeout(config.timeout())
      .user_agent(config.user_agent.clone());
    if !config.system_proxy {
      builder = builder.no_proxy();
    }
    Ok(Self { client: builder.build()?, retries: config.retries, backoff: config.backoff() })
  }

  /// `GET url` as text.
  ///
  /// `Ok(None)` means the server answered 404: the source publishes nothing
  /// at that address. Transient failures are retried with linear backoff;
  /// any other non-success status is an error.
  pub async fn get_text(&self, url: &str) -> Result<Option<String>> {
    let mut attempt = 0;
    loop {
      match self.get_once(url).await {
        Err(e) if e.is_transient() && attempt < self.retries => {
          attempt += 1;
          warn!(%url, attempt, "retrying after {e}");
          tokio::time::sleep(self.backoff * attempt).await;
        }
        other => return other,
      }
    }
  }

  async fn get_once(&self, url: &str) -> Result<Option<String>> {
    let resp = self.client.get(url).send().await?;
    let status = resp.status();
    debug!(%url, %status, "fetched");

    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      return Err(Error::Status { url: url.to_owned(), status: status.as_u16() });
    }
    Ok(Some(resp.text().await?))
  }
}
