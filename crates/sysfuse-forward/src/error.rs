/// Errors that can occur while forwarding a snapshot.
///
/// # Examples
///
/// ```rust
/// use sysfuse_forward::error::ForwardError;
///
/// let err = ForwardError::Rejected { status: 502, body: "bad gateway".to_string() };
/// assert!(err.to_string().contains("502"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The snapshot could not be encoded as JSON.
    #[error("Forward: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connecting, sending or waiting for the response failed or timed out.
    #[error("Forward: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The central server answered with a non-success status.
    #[error("Forward: server rejected snapshot: status={status}, body={body}")]
    Rejected { status: u16, body: String },
}

/// Convenience `Result` alias for forwarding operations.
pub type Result<T> = std::result::Result<T, ForwardError>;
