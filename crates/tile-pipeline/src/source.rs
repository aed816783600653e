//! Byte sources for work items.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::trace;

use crate::error::{FetchError, PipelineError, PipelineResult};

/// Anything that can resolve a URL to bytes.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// HTTP(S) source over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(request_timeout: Duration) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .tcp_nodelay(true)
            .user_agent(concat!("tile-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::HttpClient(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl TileSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        trace!(url = %url, status = status.as_u16(), "Source responded");

        match status {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            s if s.is_success() => response
                .bytes()
                .await
                .map_err(|e| classify_reqwest_error(url, e)),
            s => Err(FetchError::Status {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

fn classify_reqwest_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
