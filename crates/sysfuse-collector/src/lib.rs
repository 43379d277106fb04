//! Metric sources for the sysfuse agent.
//!
//! Two inputs feed every window:
//!
//! - [`syscall::SyscallAggregator`] counts security syscall notifications
//!   pushed by the webhook listener.
//! - A [`MetricsSource`] returns the raw exposition text of the local
//!   resource exporter, which [`exposition::parse`] reduces to a
//!   [`ResourceMetricSet`](sysfuse_common::types::ResourceMetricSet).

pub mod exposition;
pub mod scrape;
pub mod syscall;

use anyhow::Result;
use async_trait::async_trait;

pub use exposition::MetricSelection;
pub use scrape::HttpMetricsSource;
pub use syscall::SyscallAggregator;

/// A pull-based provider of exposition text.
///
/// Called exactly once per flush by the snapshot builder. A failure is not
/// fatal to the window: the builder proceeds with an empty resource set.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Source name used in log fields.
    fn name(&self) -> &str;

    /// Fetches the current exposition text.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable, times out, or answers
    /// with a non-success status.
    async fn fetch(&self) -> Result<String>;
}
