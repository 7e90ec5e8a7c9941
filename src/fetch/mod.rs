//! HTTP access to upstream feeds.

mod basic;

pub use basic::BasicClient;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Request, Response};
use tracing::debug;

use crate::error::{Result, fetch_error};

/// Longest slice of an error response body kept in the error message.
const ERROR_BODY_EXCERPT: usize = 200;

/// Executes requests. Seam for wrapping or replacing the underlying client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Issues a GET for `url` and returns the body of a successful response.
///
/// Non-success statuses are errors carrying a short excerpt of the body.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let parsed: reqwest::Url = url.parse().map_err(|e| fetch_error(format!("invalid url: {e}")))?;
    let req = Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await.map_err(|e| fetch_error(e.without_url()))?;
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
        return Err(fetch_error(format!("status {status}: {excerpt}")));
    }

    let bytes = resp.bytes().await.map_err(|e| fetch_error(e.without_url()))?;
    debug!(bytes = bytes.len(), "Feed bytes received");
    Ok(bytes)
}
