//! Transport boundary
//!
//! A transport performs the actual network I/O. The manager hands it a
//! prepared request plus an [`EventSink`] and from then on only refers to the
//! task by its [`TaskKey`]. Reports flow back over a channel, so a transport
//! never owns the manager and reports sent after teardown are dropped.

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::*;

use crate::error::GetrError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

/// Opaque handle for a task created by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey(pub u64);

/// Everything a transport needs to run one download
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Target URL with the query already encoded
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    /// Request and resource timeout, captured when the download was created
    pub timeout: Duration,
    pub destination: PathBuf,
}

/// Raw report from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Progress {
        fraction_completed: f64,
        bytes_received: u64,
        total_bytes: Option<u64>,
    },
    /// Terminal report; `Err` carries the transport's error description
    Finished(Result<(), String>),
}

pub(crate) type EventSender = mpsc::UnboundedSender<(Uuid, TransportEvent)>;

/// Reporting handle bound to a single download
#[derive(Debug, Clone)]
pub struct EventSink {
    id: Uuid,
    tx: EventSender,
}

impl EventSink {
    pub(crate) fn new(id: Uuid, tx: EventSender) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn progress(&self, fraction_completed: f64, bytes_received: u64, total_bytes: Option<u64>) {
        self.send(TransportEvent::Progress {
            fraction_completed,
            bytes_received,
            total_bytes,
        });
    }

    pub fn succeeded(&self) {
        self.send(TransportEvent::Finished(Ok(())));
    }

    pub fn failed(&self, description: impl Into<String>) {
        self.send(TransportEvent::Finished(Err(description.into())));
    }

    /// True once the manager is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: TransportEvent) {
        let _ = self.tx.send((self.id, event));
    }
}

/// The network layer behind a download manager.
///
/// Control calls are made while the manager holds its registry lock, so they
/// must return promptly and must not call back into the manager.
pub trait Transport: Send + Sync + 'static {
    /// Create a task for `request` without starting it
    fn create_task(&self, request: TransportRequest, events: EventSink) -> Result<TaskKey, GetrError>;

    /// Start the task, or continue it after `suspend`
    fn resume(&self, key: TaskKey);

    fn suspend(&self, key: TaskKey);

    /// Abort the task. No terminal report is required afterwards.
    fn cancel(&self, key: TaskKey);

    /// Forget the task entirely; called when its record is evicted
    fn release(&self, key: TaskKey) {
        let _ = key;
    }
}
