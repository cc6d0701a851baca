//! HTTP fetching with status-class mapping.

use crate::error::{SyncError, SyncResult};
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use stillage_core::stream::ByteStream;

/// Thin HTTP client for repository origins.
///
/// No retries at this layer; retry policy belongs to the orchestrator. The
/// timeout covers the whole request including the body, which is why the
/// configured default is generous.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// GET a URL, returning the response body as a stream on HTTP 200 and
    /// [`SyncError::UnexpectedStatus`] on anything else.
    pub async fn get(&self, url: &str) -> SyncResult<ByteStream> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SyncError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(std::io::Error::other)),
        ))
    }

    /// Probe a URL with HEAD; true iff the origin answered HTTP 200.
    pub async fn head(&self, url: &str) -> SyncResult<bool> {
        let response = self.client.head(url).send().await?;
        Ok(response.status() == StatusCode::OK)
    }
}
