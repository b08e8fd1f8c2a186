use crate::docker::NODE_PORT;
use async_trait::async_trait;
use log::debug;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::Deserialize;
use shared::models::NodeStatus;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) fn status_url() -> String {
    format!("http://localhost:{NODE_PORT}/status")
}

/// Answers what the node container is doing right now.
#[async_trait]
pub(crate) trait StatusProbe: Send + Sync {
    /// Never fails: an unreachable or confused node reads as inactive.
    async fn status(&self) -> NodeStatus;
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: i64,
}

pub(crate) struct HttpStatusProbe {
    client: Client,
    url: String,
}

impl HttpStatusProbe {
    pub(crate) fn new() -> Self {
        Self::with_url(status_url())
    }

    pub(crate) fn with_url(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    async fn fetch(&self) -> anyhow::Result<NodeStatus> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("status endpoint responded with {}", response.status());
        }
        let body: StatusResponse = response.json().await?;
        NodeStatus::try_from(body.status)
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn status(&self) -> NodeStatus {
        match self.fetch().await {
            Ok(status) => status,
            Err(e) => {
                debug!("Node status unavailable: {e}");
                NodeStatus::Inactive
            }
        }
    }
}
