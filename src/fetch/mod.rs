//! Image retrieval: a transport that performs one request, and a fetcher
//! that wraps it with the retry budget.
//!
//! Callers depend on [`ImageTransport`], never on HTTP details, so tests can
//! substitute a scripted transport.

mod client;
mod retry;

pub use client::HttpTransport;
pub use retry::RetryingFetcher;

use crate::error::FetchError;

/// The ability to fetch the bytes behind one image reference, once.
#[async_trait::async_trait]
pub trait ImageTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
