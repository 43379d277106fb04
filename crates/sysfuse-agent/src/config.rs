use serde::Deserialize;
use std::time::Duration;
use sysfuse_collector::MetricSelection;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifies this host to the central server (`X-Node-ID` header)
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Window length; flushes fire on multiples of this many seconds since the epoch
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    pub central_server_url: String,
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_secs: u64,
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: String,
    #[serde(default = "default_metrics_timeout")]
    pub metrics_timeout_secs: u64,
    /// Address of the webhook listener receiving syscall events
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_csv_dir")]
    pub csv_dir: String,
    /// Days of CSV partitions to keep; 0 keeps everything
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default)]
    pub metrics: MetricSelection,
}

fn default_node_id() -> String {
    "unknown-node".to_string()
}

fn default_flush_interval() -> u64 {
    10
}

fn default_forward_timeout() -> u64 {
    10
}

fn default_metrics_endpoint() -> String {
    "http://localhost:9100/metrics".to_string()
}

fn default_metrics_timeout() -> u64 {
    5
}

fn default_listen_addr() -> String {
    "0.0.0.0:7744".to_string()
}

fn default_csv_dir() -> String {
    "data".to_string()
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.flush_interval_secs == 0 {
            anyhow::bail!("flush_interval_secs must be greater than 0");
        }
        if self.central_server_url.trim().is_empty() {
            anyhow::bail!("central_server_url must not be empty");
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_timeout_secs)
    }
}
