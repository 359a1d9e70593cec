//! HTTP client for fetching step results from peer chunk servers.
//!
//! Sends `GET http://{peer}/api/cache/{cache_key}` and expects a
//! [`GetChunkResponse`]. Every request is bounded by the client-wide
//! deadline; there is no retry.

use std::time::Duration;

use biosphere_types::{CacheKey, GetChunkResponse};

/// Client for peer chunk servers.
#[derive(Debug, Clone)]
pub struct PeerClient {
    client: reqwest::Client,
}

impl PeerClient {
    /// A client whose requests fail after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the [`reqwest::Error`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Fetch the state a peer holds under `key`.
    ///
    /// # Errors
    ///
    /// Returns the [`reqwest::Error`] on timeout, connection failure, a
    /// non-success status, or an unparseable body.
    pub async fn get_chunk(&self, peer: &str, key: CacheKey) -> Result<GetChunkResponse, reqwest::Error> {
        let url = format!("http://{peer}/api/cache/{key}");
        self.client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
