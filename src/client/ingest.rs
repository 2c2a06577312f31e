//! Ingestion endpoint client
//!
//! Provides `IngestClient` for submitting record batches and checking endpoint
//! health.

use super::Auth;
use crate::etl::Loader;
use crate::model::NormalizedRecord;
use eyre::{Result, WrapErr, eyre};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Default bound on one batch submission
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Body returned by the health operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Ingestion endpoint client.
///
/// `submit_batch` posts a JSON array of records to the configured URL. Any 2xx
/// response is success; every other status, and any transport error, is a
/// failure.
///
/// # Example
/// ```no_run
/// use lane_etl::client::{Auth, IngestClient};
/// use url::Url;
///
/// # async fn example() -> eyre::Result<()> {
/// let url = Url::parse("http://localhost:8080/load")?;
/// let client = IngestClient::try_new(url, Auth::Bearer("token".into()))?;
///
/// let health = client.health().await?;
/// println!("endpoint is {}", health.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct IngestClient {
    client: Client,
    url: Url,
    health_url: Url,
}

impl IngestClient {
    /// Create a client with the default request timeout.
    ///
    /// The health check URL is derived from the load URL by replacing its last
    /// path segment with `health`, e.g. `http://host:8080/load` checks
    /// `http://host:8080/health`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn try_new(url: Url, auth: Auth) -> Result<Self> {
        Self::with_timeout(url, auth, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(url: Url, auth: Auth, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(value) = auth.header_value() {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                value
                    .parse::<reqwest::header::HeaderValue>()
                    .wrap_err("Invalid characters in auth token")?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;

        let health_url = url
            .join("health")
            .wrap_err_with(|| format!("Cannot derive health URL from {}", url))?;

        Ok(Self {
            client,
            url,
            health_url,
        })
    }

    /// Get the load URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }

    /// Submit one batch of records.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx response, including
    /// the response body when one is available
    pub async fn submit_batch(&self, records: &[NormalizedRecord]) -> Result<()> {
        log::debug!("Submitting {} record(s) to {}", records.len(), self.url);

        let response = self
            .client
            .post(self.url.clone())
            .json(records)
            .send()
            .await
            .map_err(|e| eyre!("Failed to send batch: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("Ingestion endpoint rejected batch ({}): {}", status, body);
        }

        Ok(())
    }

    /// Query the endpoint's health operation.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-2xx response, or an
    /// unexpected body
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|e| eyre!("Failed to reach {}: {}", self.health_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("Health check failed ({}): {}", status, body);
        }

        response
            .json::<HealthStatus>()
            .await
            .wrap_err("Failed to parse health response")
    }
}

impl Loader for IngestClient {
    type Item = NormalizedRecord;

    async fn load(&self, items: &[Self::Item]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        self.submit_batch(items).await?;
        Ok(items.len())
    }
}

impl std::fmt::Display for IngestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}
