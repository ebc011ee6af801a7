//! Download Manager - the registry that owns every download record
//!
//! This is the single authority for download state:
//! - Creates records and binds them to transport tasks
//! - Enforces the status state machine for start/pause/resume/cancel
//! - Applies transport reports (progress and terminal outcomes)
//! - Evicts finished records on request or after a retention period
//!
//! Caller operations and transport reports take the same lock before
//! touching a record. Reports reach the registry through a channel drained
//! by a dispatcher task that only holds a weak reference.

use crate::completion::{self, CompletedDownload, Completion, CompletionSignal, ProgressCallback};
use crate::config;
use crate::destination::resolve_destination;
use crate::error::GetrError;
use crate::estimator::{Clock, ProgressEstimator, SystemClock};
use crate::request::build_url;
use crate::transport::{EventSender, EventSink, TaskKey, Transport, TransportEvent, TransportRequest};
use chrono::{DateTime, Utc};
use getr_types::{
    DownloadInfo, DownloadRequest, DownloadStatus, KnownFolders, ManagerEvent, ProgressEvent, Settings,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stored state for one download
struct DownloadRecord {
    id: Uuid,
    url: String,
    destination: PathBuf,
    status: DownloadStatus,
    bytes_received: u64,
    total_bytes: Option<u64>,
    estimator: ProgressEstimator,
    /// Bound by `start()`, taken when settled
    completion: Option<CompletionSignal>,
    /// Lookup key only; the task itself belongs to the transport
    task: TaskKey,
    error: Option<String>,
    created_at: DateTime<Utc>,
    finished: Option<(DateTime<Utc>, Instant)>,
}

impl DownloadRecord {
    fn info(&self) -> DownloadInfo {
        DownloadInfo {
            id: self.id,
            url: self.url.clone(),
            destination: self.destination.clone(),
            status: self.status,
            bytes_received: self.bytes_received,
            total_bytes: self.total_bytes,
            error: self.error.clone(),
            created_at: self.created_at,
            finished_at: self.finished.map(|(at, _)| at),
        }
    }

    fn finished_for(&self, max_age: Duration) -> bool {
        matches!(self.finished, Some((_, at)) if at.elapsed() >= max_age)
    }
}

struct Inner {
    records: Mutex<HashMap<Uuid, DownloadRecord>>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    folders: KnownFolders,
    settings: Settings,
    /// Event broadcaster
    event_tx: broadcast::Sender<ManagerEvent>,
    /// Cloned into every event sink handed to the transport
    transport_tx: EventSender,
    /// Fallback runtime for delivery when `start()` runs outside one
    runtime: Handle,
}

/// Builder for [`DownloadManager`]
pub struct ManagerBuilder {
    transport: Arc<dyn Transport>,
    settings: Settings,
    folders: KnownFolders,
    clock: Arc<dyn Clock>,
}

impl ManagerBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn folders(mut self, folders: KnownFolders) -> Self {
        self.folders = folders;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the manager. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<DownloadManager, GetrError> {
        let runtime = Handle::try_current()?;
        let (event_tx, _) = broadcast::channel(1000);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            records: Mutex::new(HashMap::new()),
            transport: self.transport,
            clock: self.clock,
            folders: self.folders,
            settings: self.settings,
            event_tx,
            transport_tx,
            runtime: runtime.clone(),
        });

        runtime.spawn(dispatch(Arc::downgrade(&inner), transport_rx));

        Ok(DownloadManager { inner })
    }
}

/// Download manager that owns all download records
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Create a manager with default settings
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, GetrError> {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Arc<dyn Transport>) -> ManagerBuilder {
        ManagerBuilder {
            transport,
            settings: Settings::default(),
            folders: KnownFolders::system(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Subscribe to manager events
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Create a pending download bound to a new, not yet running transport task
    pub fn create(&self, request: &DownloadRequest) -> Result<Uuid, GetrError> {
        let url = build_url(&request.url, request.query.as_ref())?;

        let directory = request
            .path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .or(self.inner.settings.default_directory.as_deref());
        let destination = resolve_destination(directory, request.file_name.as_deref(), &self.inner.folders)?;

        let timeout = self
            .inner
            .settings
            .transport_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(config::transport_timeout);

        if let Some(secs) = self.inner.settings.finished_retention_secs {
            self.purge_finished(Duration::from_secs(secs));
        }

        let id = Uuid::new_v4();
        let sink = EventSink::new(id, self.inner.transport_tx.clone());
        let task = self.inner.transport.create_task(
            TransportRequest {
                url: url.clone(),
                headers: request.headers.clone(),
                timeout,
                destination: destination.clone(),
            },
            sink,
        )?;

        let record = DownloadRecord {
            id,
            url: url.to_string(),
            destination,
            status: DownloadStatus::Pending,
            bytes_received: 0,
            total_bytes: None,
            estimator: ProgressEstimator::new(Duration::from_millis(self.inner.settings.throttle_window_ms)),
            completion: None,
            task,
            error: None,
            created_at: Utc::now(),
            finished: None,
        };
        let info = record.info();

        self.inner.records.lock().insert(id, record);
        info!("Created download {}: {} -> {}", id, url, info.destination.display());
        self.inner.emit(ManagerEvent::Added { download: info });

        Ok(id)
    }

    /// Start (or restart) a download without a progress callback
    pub fn start(&self, id: Uuid) -> Completion {
        self.start_inner(id, None)
    }

    /// Start a download, forwarding throttled progress samples to `on_progress`
    pub fn start_with_progress<F>(&self, id: Uuid, on_progress: F) -> Completion
    where
        F: FnMut(ProgressEvent) + Send + 'static,
    {
        self.start_inner(id, Some(Box::new(on_progress)))
    }

    fn start_inner(&self, id: Uuid, callback: Option<ProgressCallback>) -> Completion {
        let mut records = self.inner.records.lock();
        let Some(record) = records.get_mut(&id) else {
            debug!("start: download {} not found", id);
            return Completion::settled(id, Err(GetrError::NotFound(id)));
        };

        if record.status.is_terminal() {
            debug!("start: download {} already {}", id, record.status);
            return Completion::settled(id, Err(GetrError::AlreadyFinished(record.status)));
        }

        // Deliver on the caller's runtime when there is one
        let runtime = Handle::try_current().unwrap_or_else(|_| self.inner.runtime.clone());
        let (signal, completion) = completion::bind(id, callback, &runtime);

        if let Some(previous) = record.completion.replace(signal) {
            info!("Download {} restarted, superseding previous completion", id);
            previous.settle(Err(GetrError::Superseded));
        }

        record.estimator.start(self.inner.clock.now_millis());
        self.inner.transition(record, DownloadStatus::Downloading, None);
        self.inner.transport.resume(record.task);

        completion
    }

    /// Suspend a downloading download. No-op otherwise.
    pub fn pause(&self, id: Uuid) {
        let mut records = self.inner.records.lock();
        let Some(record) = records.get_mut(&id) else {
            debug!("pause: download {} not found", id);
            return;
        };

        if record.status != DownloadStatus::Downloading {
            debug!("pause: download {} is {}, ignoring", id, record.status);
            return;
        }

        self.inner.transport.suspend(record.task);
        self.inner.transition(record, DownloadStatus::Paused, None);
    }

    /// Continue a paused download. No-op otherwise.
    pub fn resume(&self, id: Uuid) {
        let mut records = self.inner.records.lock();
        let Some(record) = records.get_mut(&id) else {
            debug!("resume: download {} not found", id);
            return;
        };

        if record.status != DownloadStatus::Paused {
            debug!("resume: download {} is {}, ignoring", id, record.status);
            return;
        }

        self.inner.transport.resume(record.task);
        self.inner.transition(record, DownloadStatus::Downloading, None);
    }

    /// Abort a download that has not finished. A bound completion settles
    /// with [`GetrError::Canceled`].
    pub fn cancel(&self, id: Uuid) {
        let mut records = self.inner.records.lock();
        let Some(record) = records.get_mut(&id) else {
            debug!("cancel: download {} not found", id);
            return;
        };

        if record.status.is_terminal() {
            debug!("cancel: download {} already {}", id, record.status);
            return;
        }

        self.inner.transport.cancel(record.task);
        self.inner.transition(record, DownloadStatus::Canceled, None);
        if let Some(signal) = record.completion.take() {
            signal.settle(Err(GetrError::Canceled));
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Status of a download; unknown ids report `Pending`
    pub fn get_status(&self, id: Uuid) -> DownloadStatus {
        self.inner
            .records
            .lock()
            .get(&id)
            .map(|record| record.status)
            .unwrap_or(DownloadStatus::Pending)
    }

    /// Destination fixed at creation, or `None` for unknown ids
    pub fn get_path(&self, id: Uuid) -> Option<PathBuf> {
        self.inner.records.lock().get(&id).map(|record| record.destination.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<DownloadInfo> {
        self.inner.records.lock().get(&id).map(DownloadRecord::info)
    }

    /// All downloads, oldest first
    pub fn list(&self) -> Vec<DownloadInfo> {
        let mut downloads: Vec<_> = self.inner.records.lock().values().map(DownloadRecord::info).collect();
        downloads.sort_by_key(|d| d.created_at);
        downloads
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Drop a download, canceling it first if it is still active.
    /// Returns false for unknown ids.
    pub fn remove(&self, id: Uuid) -> bool {
        let Some(mut record) = self.inner.records.lock().remove(&id) else {
            return false;
        };

        if !record.status.is_terminal() {
            self.inner.transport.cancel(record.task);
        }
        if let Some(signal) = record.completion.take() {
            signal.settle(Err(GetrError::Canceled));
        }
        self.inner.transport.release(record.task);

        info!("Removed download {}", id);
        self.inner.emit(ManagerEvent::Removed { id });
        true
    }

    /// Evict finished downloads that reached a terminal state at least
    /// `max_age` ago. Returns how many were evicted.
    pub fn purge_finished(&self, max_age: Duration) -> usize {
        let evicted: Vec<DownloadRecord> = {
            let mut records = self.inner.records.lock();
            let expired: Vec<Uuid> = records
                .values()
                .filter(|record| record.finished_for(max_age))
                .map(|record| record.id)
                .collect();
            expired.iter().filter_map(|id| records.remove(id)).collect()
        };

        for record in &evicted {
            self.inner.transport.release(record.task);
            self.inner.emit(ManagerEvent::Removed { id: record.id });
        }

        if !evicted.is_empty() {
            info!("Purged {} finished downloads", evicted.len());
        }
        evicted.len()
    }
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("downloads", &self.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl Inner {
    fn emit(&self, event: ManagerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Move `record` to `next` if the state machine allows it
    fn transition(&self, record: &mut DownloadRecord, next: DownloadStatus, error: Option<String>) -> bool {
        if record.status == next {
            return false;
        }
        if !record.status.can_transition_to(next) {
            debug!("Download {}: refusing {} -> {}", record.id, record.status, next);
            return false;
        }

        info!("Download {}: {} -> {}", record.id, record.status, next);
        record.status = next;
        record.error = error.clone();
        if next.is_terminal() {
            record.finished = Some((Utc::now(), Instant::now()));
        }

        self.emit(ManagerEvent::StatusChanged {
            id: record.id,
            status: next,
            error,
        });
        true
    }

    fn handle_transport_event(&self, id: Uuid, event: TransportEvent) {
        match event {
            TransportEvent::Progress {
                fraction_completed,
                bytes_received,
                total_bytes,
            } => self.on_progress(id, fraction_completed, bytes_received, total_bytes),
            TransportEvent::Finished(result) => self.on_finished(id, result),
        }
    }

    fn on_progress(&self, id: Uuid, fraction_completed: f64, bytes_received: u64, total_bytes: Option<u64>) {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(&id) else {
            debug!("Dropping progress for unknown download {}", id);
            return;
        };

        match record.status {
            DownloadStatus::Downloading => {}
            DownloadStatus::Pending => {
                self.transition(record, DownloadStatus::Downloading, None);
            }
            other => {
                debug!("Dropping progress for {} download {}", other, id);
                return;
            }
        }

        record.bytes_received = bytes_received;
        record.total_bytes = total_bytes;

        let now = self.clock.now_millis();
        let Some(event) = record
            .estimator
            .sample(now, fraction_completed, bytes_received, total_bytes)
        else {
            return;
        };

        if let Some(signal) = &record.completion {
            signal.progress(event);
        }
        self.emit(ManagerEvent::Progress { id, progress: event });
    }

    fn on_finished(&self, id: Uuid, result: Result<(), String>) {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(&id) else {
            debug!("Dropping terminal report for unknown download {}", id);
            return;
        };

        if record.status.is_terminal() {
            debug!("Dropping terminal report for {} download {}", record.status, id);
            return;
        }

        let Some(signal) = record.completion.take() else {
            debug!("Dropping terminal report for download {} that was never started", id);
            return;
        };

        match result {
            Ok(()) => {
                self.transition(record, DownloadStatus::Completed, None);
                signal.settle(Ok(CompletedDownload {
                    id,
                    path: record.destination.clone(),
                }));
            }
            Err(message) => {
                warn!("Download {} failed: {}", id, message);
                self.transition(record, DownloadStatus::Error, Some(message.clone()));
                signal.settle(Err(GetrError::Transport(message)));
            }
        }
    }
}

/// Drain transport reports into the registry until the manager is gone
async fn dispatch(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<(Uuid, TransportEvent)>) {
    while let Some((id, event)) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_transport_event(id, event);
    }
    debug!("Transport dispatcher stopped");
}
