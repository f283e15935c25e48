//! Authenticated bearer fetch of export links.

use super::ByteSink;
use crate::config::HttpConfig;
use crate::error::{Error, RemoteError, Result};
use tokio::io::AsyncWriteExt;

/// Longest response body kept in an HTTP error
const MAX_ERROR_BODY: usize = 512;

/// Fetches a URL with a bearer token, streaming the body into a sink
#[async_trait::async_trait]
pub trait LinkFetcher: Send + Sync {
    /// GET `url` with `Authorization: Bearer <token>`; returns bytes written
    async fn fetch(&self, url: &str, token: &str, sink: &mut ByteSink<'_>) -> Result<u64>;
}

/// reqwest-based [`LinkFetcher`]
#[derive(Clone, Debug)]
pub struct HttpLinkFetcher {
    client: reqwest::Client,
}

impl HttpLinkFetcher {
    /// Build a fetcher with the configured connect timeout
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl LinkFetcher for HttpLinkFetcher {
    async fn fetch(&self, url: &str, token: &str, sink: &mut ByteSink<'_>) -> Result<u64> {
        let mut response = self.client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            tracing::warn!(status = status.as_u16(), "Export link fetch rejected");
            return Err(Error::Remote(RemoteError::Http {
                status: status.as_u16(),
                body,
            }));
        }

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        tracing::debug!(bytes = written, "Export link fetched");
        Ok(written)
    }
}
