// src/fetch/client.rs
//! Thin reqwest wrapper that downloads a single image.

use super::ImageTransport;
use crate::config::RetryPolicy;
use crate::constants::FETCH_USER_AGENT;
use crate::error::{AppError, FetchError};
use reqwest::{header, Client};

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5";

/// Performs one GET per call with the configured connect and read timeouts.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a client with the policy's timeouts.
    ///
    /// reqwest applies `timeout` to the whole exchange, so the read timeout
    /// bounds everything after the connection is established.
    pub fn new(policy: &RetryPolicy) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(policy.connect_timeout)
            .timeout(policy.connect_timeout + policy.read_timeout)
            .user_agent(FETCH_USER_AGENT)
            .default_headers(Self::create_headers())
            .build()?;
        Ok(Self { client })
    }

    fn create_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(IMAGE_ACCEPT),
        );
        headers
    }
}

#[async_trait::async_trait]
impl ImageTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
