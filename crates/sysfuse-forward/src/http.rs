use crate::error::{ForwardError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::Forwarder;
use async_trait::async_trait;
use std::time::Duration;
use sysfuse_common::types::CombinedSnapshot;

/// Header the central aggregator uses to key incoming snapshots by host.
pub const NODE_ID_HEADER: &str = "X-Node-ID";

/// POSTs each snapshot as JSON to the central server.
pub struct HttpForwarder {
    url: String,
    node_id: String,
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(url: &str, node_id: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            node_id: node_id.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, snapshot: &CombinedSnapshot) -> Result<()> {
        let body = snapshot.to_json()?;

        let resp = self
            .client
            .post(self.url.as_str())
            .header("Content-Type", "application/json")
            .header(NODE_ID_HEADER, self.node_id.as_str())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(url = %self.url, status = %status, "Snapshot forwarded");
            return Ok(());
        }

        let body = match resp.text().await {
            Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
            Err(e) => format!("[Failed to read response body: {e}]"),
        };
        Err(ForwardError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn target(&self) -> &str {
        &self.url
    }
}
