//! Shared types for getr
//!
//! This crate contains the plain data structures exchanged between
//! the download engine and its front-ends (CLI, bindings).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

/// Input for creating a download. The registry never stores it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Destination directory
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Destination file name
    #[serde(default)]
    pub file_name: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a single query parameter, switching to the pairs shape if needed
    pub fn query_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut pairs = match self.query.take() {
            Some(Query::Pairs(pairs)) => pairs,
            _ => BTreeMap::new(),
        };
        pairs.insert(key.into(), value.into());
        self.query = Some(Query::Pairs(pairs));
        self
    }

    /// Use a pre-encoded query string
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.query = Some(Query::Encoded(query.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Query parameters, either as a key/value mapping or an already encoded string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    Pairs(BTreeMap<String, String>),
    Encoded(String),
}

// ============================================================================
// Download Types
// ============================================================================

/// Lifecycle state of a download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadStatus {
    #[default]
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
    Canceled,
}

impl DownloadStatus {
    /// Completed, errored and canceled downloads accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Error | DownloadStatus::Canceled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;

        match (self, next) {
            (Pending, Downloading | Canceled) => true,
            (Downloading, Paused | Completed | Error | Canceled) => true,
            // A suspended transfer can still deliver its final report
            (Paused, Downloading | Completed | Error | Canceled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::Pending => "PENDING",
            DownloadStatus::Downloading => "DOWNLOADING",
            DownloadStatus::Paused => "PAUSED",
            DownloadStatus::Completed => "COMPLETED",
            DownloadStatus::Error => "ERROR",
            DownloadStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of a download record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub id: Uuid,
    pub url: String,
    pub destination: PathBuf,
    pub status: DownloadStatus,
    pub bytes_received: u64,
    pub total_bytes: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadInfo {
    pub fn progress(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => (self.bytes_received as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }
}

// ============================================================================
// Payload Types
// ============================================================================

/// Throttled progress sample handed to a download's progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Whole percent, 0-100
    pub value: u8,
    /// Bytes per millisecond since the previous forwarded sample
    pub speed: u64,
    pub current_size: u64,
    /// `None` while the server has not announced a length
    pub total_size: Option<u64>,
}

/// Terminal payload of a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub status: DownloadStatus,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CompletionEvent {
    pub fn completed(path: PathBuf) -> Self {
        Self {
            status: DownloadStatus::Completed,
            message: None,
            path: Some(path),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: DownloadStatus::Error,
            message: Some(message.into()),
            path: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: DownloadStatus::Canceled,
            message: Some("Download was canceled.".to_string()),
            path: None,
        }
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Events broadcast by the download manager to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ManagerEvent {
    Added {
        download: DownloadInfo,
    },
    StatusChanged {
        id: Uuid,
        status: DownloadStatus,
        error: Option<String>,
    },
    Progress {
        id: Uuid,
        progress: ProgressEvent,
    },
    Removed {
        id: Uuid,
    },
}

// ============================================================================
// Settings Types
// ============================================================================

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Request and resource timeout captured by each new transport task;
    /// `None` uses the process-wide default
    pub transport_timeout_secs: Option<u64>,
    /// Minimum interval between forwarded progress samples
    pub throttle_window_ms: u64,
    /// Directory used when a request names none (falls back to the temp dir)
    pub default_directory: Option<PathBuf>,
    /// Terminal records older than this are evicted on the next create
    pub finished_retention_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport_timeout_secs: None,
            throttle_window_ms: 100,
            default_directory: None,
            finished_retention_secs: None,
        }
    }
}

/// Well-known directories a destination can be resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownFolders {
    pub temp: PathBuf,
    pub documents: Option<PathBuf>,
}

impl KnownFolders {
    pub fn system() -> Self {
        Self {
            temp: std::env::temp_dir(),
            documents: dirs::document_dir(),
        }
    }
}

impl Default for KnownFolders {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        use DownloadStatus::*;

        for from in [Completed, Error, Canceled] {
            assert!(from.is_terminal());
            for to in [Pending, Downloading, Paused, Completed, Error, Canceled] {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn pending_cannot_pause_or_finish() {
        use DownloadStatus::*;

        assert!(Pending.can_transition_to(Downloading));
        assert!(Pending.can_transition_to(Canceled));
        assert!(!Pending.can_transition_to(Paused));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Error));
    }

    #[test]
    fn pause_resume_cycle_is_allowed() {
        use DownloadStatus::*;

        assert!(Downloading.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Downloading));
        assert!(!Paused.can_transition_to(Paused));
    }

    #[test]
    fn progress_payload_uses_wire_names() {
        let event = ProgressEvent {
            value: 42,
            speed: 7,
            current_size: 420,
            total_size: Some(1000),
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value": 42, "speed": 7, "currentSize": 420, "totalSize": 1000})
        );
    }

    #[test]
    fn completion_payloads_match_wire_shape() {
        let done = serde_json::to_value(CompletionEvent::completed(PathBuf::from("/tmp/a.bin"))).unwrap();
        assert_eq!(
            done,
            serde_json::json!({"status": "COMPLETED", "message": null, "path": "/tmp/a.bin"})
        );

        let failed = serde_json::to_value(CompletionEvent::failed("timed out")).unwrap();
        assert_eq!(failed, serde_json::json!({"status": "ERROR", "message": "timed out"}));
    }

    #[test]
    fn query_accepts_both_shapes() {
        let pairs: Query = serde_json::from_str(r#"{"a":"1"}"#).unwrap();
        assert!(matches!(pairs, Query::Pairs(ref m) if m["a"] == "1"));

        let encoded: Query = serde_json::from_str(r#""a=1&b=2""#).unwrap();
        assert_eq!(encoded, Query::Encoded("a=1&b=2".to_string()));
    }

    #[test]
    fn request_builder_merges_query_pairs() {
        let request = DownloadRequest::new("https://example.com/file")
            .query_string("x=1")
            .query_pair("a", "1")
            .query_pair("b", "2");

        match request.query {
            Some(Query::Pairs(pairs)) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs["b"], "2");
            }
            other => panic!("unexpected query: {:?}", other),
        }
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"transport_timeout_secs": 5}"#).unwrap();
        assert_eq!(settings.transport_timeout_secs, Some(5));
        assert_eq!(settings.throttle_window_ms, 100);
        assert_eq!(settings.default_directory, None);
    }
}
