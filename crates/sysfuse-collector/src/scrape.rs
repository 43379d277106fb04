use crate::MetricsSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Pulls exposition text from a local exporter over HTTP.
pub struct HttpMetricsSource {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpMetricsSource {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build metrics HTTP client")?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.endpoint.as_str())
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned HTTP {status}", self.endpoint);
        }

        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read body from {}", self.endpoint))?;
        tracing::trace!(endpoint = %self.endpoint, bytes = body.len(), "Fetched exposition text");
        Ok(body)
    }
}
