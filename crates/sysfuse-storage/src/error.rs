use std::path::PathBuf;

/// Errors that can occur within the CSV persistence layer.
///
/// # Examples
///
/// ```rust
/// use sysfuse_storage::error::StorageError;
///
/// let err = StorageError::InvalidHeader {
///     path: "data/2024-05-01.csv".into(),
///     reason: "first column is not 'timestamp'".to_string(),
/// };
/// assert!(err.to_string().contains("2024-05-01.csv"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Creating, opening, reading, writing or syncing a file failed.
    #[error("Storage: I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An existing partition file starts with something that is not a
    /// header this agent wrote.
    #[error("Storage: invalid header in {}: {reason}", path.display())]
    InvalidHeader { path: PathBuf, reason: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
