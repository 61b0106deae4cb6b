//! Network reachability probing.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{DEFAULT_PROBE_TIMEOUT, DEFAULT_PROBE_URL};

/// Answers whether the backend is worth trying right now
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes reachability with a `HEAD` request to an always-up endpoint.
///
/// Any HTTP response counts as reachable; a transport error or timeout
/// counts as unreachable.
#[derive(Debug, Clone)]
pub struct HttpConnectivityProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpConnectivityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for HttpConnectivityProbe {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROBE_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_PROBE_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                tracing::trace!(status = response.status().as_u16(), "Connectivity probe answered");
                true
            }
            Err(error) => {
                tracing::debug!(url = %self.url, error = %error, "Connectivity probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unroutable_endpoint_is_unreachable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let probe =
            HttpConnectivityProbe::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
        assert!(!probe.is_reachable().await);
    }

    #[test]
    fn default_probe_targets_well_known_endpoint() {
        assert_eq!(HttpConnectivityProbe::default().url(), DEFAULT_PROBE_URL);
    }
}
