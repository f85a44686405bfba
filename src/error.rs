//! Request-level failure taxonomy.
//!
//! Every operation classifies its failure before any mutation happens, so a
//! rejected request leaves no side effects behind. The REST layer maps each
//! variant onto an HTTP status in its `IntoResponse` impl.

use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required input was missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// Path or session does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The supplied path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Name collision on create or rename.
    #[error("{0}")]
    AlreadyExists(String),

    /// The OS refused a rename/delete/write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// External build/init subprocess failed. `output` carries the tool's
    /// diagnostic text unmodified.
    #[error("{reason}: {output}")]
    ExternalTool { reason: String, output: String },

    /// A second export was requested while one is still running for the
    /// same session.
    #[error("an export is already in progress for session {0}")]
    BuildInProgress(String),

    /// Relocation of a verified build output could not be confirmed; the
    /// source output was left in place.
    #[error("relocation failed: {0}")]
    RelocateFailed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Classify an I/O failure at the OS call site. Permission denials are
    /// reported distinctly from generic failures.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => {
                Self::NotFound(format!("{} does not exist", path.display()))
            }
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.display().to_string()),
            _ => Self::Internal(
                anyhow::Error::new(err).context(format!("io error at {}", path.display())),
            ),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.into())
    }
}
