//! Best-effort delivery of combined snapshots to the central collector.
//!
//! A [`Forwarder`] gets exactly one attempt per window. Callers log and drop
//! any [`ForwardError`]; nothing is queued or retried.

pub mod error;
pub mod http;
pub mod utils;

pub use error::{ForwardError, Result};
pub use http::HttpForwarder;

use async_trait::async_trait;
use sysfuse_common::types::CombinedSnapshot;

/// Sends a snapshot to a remote peer.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Delivers the snapshot once, bounded by the forwarder's own timeout.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization failure, transport failure, timeout
    /// or a non-success response status.
    async fn forward(&self, snapshot: &CombinedSnapshot) -> Result<()>;

    /// Destination description used in log fields.
    fn target(&self) -> &str;
}
