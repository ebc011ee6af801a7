//! Error types for getr core

use getr_types::{CompletionEvent, DownloadStatus};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in getr core
#[derive(Debug, Error)]
pub enum GetrError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Download ID not found.")]
    NotFound(Uuid),

    /// Failure reported by the transport, carrying its description verbatim
    #[error("{0}")]
    Transport(String),

    #[error("Download was canceled")]
    Canceled,

    #[error("Download was restarted before it finished")]
    Superseded,

    #[error("Download already finished with status {0}")]
    AlreadyFinished(DownloadStatus),

    #[error("Download manager shut down before the download finished")]
    Shutdown,

    #[error("No async runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GetrError {
    /// Whether creating a fresh download for the same request may succeed.
    /// The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            GetrError::Transport(_) | GetrError::Io(_) => true,
            GetrError::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Status a rejected completion reports in its payload
    pub fn status(&self) -> DownloadStatus {
        match self {
            GetrError::Canceled => DownloadStatus::Canceled,
            GetrError::AlreadyFinished(status) => *status,
            _ => DownloadStatus::Error,
        }
    }
}

impl From<&GetrError> for CompletionEvent {
    fn from(error: &GetrError) -> Self {
        match error {
            GetrError::Canceled => CompletionEvent::canceled(),
            other => CompletionEvent {
                status: other.status(),
                message: Some(other.to_string()),
                path: None,
            },
        }
    }
}

// Allow converting to String for bindings that only carry messages
impl From<GetrError> for String {
    fn from(error: GetrError) -> Self {
        error.to_string()
    }
}
