use super::ImageTransport;
use crate::config::RetryPolicy;
use crate::error::FetchError;
use crate::error_recovery::retry_with_backoff;
use std::sync::Arc;

/// One image fetch with a fixed retry budget.
///
/// HTTP errors, transport errors, timeouts and empty bodies are all retried
/// alike; only running out of attempts ends the fetch.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn ImageTransport>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn ImageTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        retry_with_backoff(
            url,
            |_attempt| async move {
                let bytes = self.transport.get(url).await?;
                if bytes.is_empty() {
                    return Err(FetchError::EmptyBody);
                }
                Ok(bytes)
            },
            &self.policy,
        )
        .await
    }
}
