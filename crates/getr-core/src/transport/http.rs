//! HTTP transport backed by reqwest
//!
//! Streams the response body into `<destination>.part` and renames it onto
//! the destination once the body is complete. Suspending holds the stream
//! between chunks; canceling drops the transfer and removes the part file.

use super::{EventSink, TaskKey, Transport, TransportRequest};
use crate::error::GetrError;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Suspended,
    Canceled,
}

struct HttpTask {
    /// Taken when the task first runs
    pending: Option<(TransportRequest, EventSink)>,
    control: watch::Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

/// Transport that downloads over HTTP(S)
pub struct HttpTransport {
    client: Client,
    tasks: Mutex<HashMap<TaskKey, HttpTask>>,
    next_key: AtomicU64,
    /// Runtime the transport was built on; transfers run here when the
    /// control call comes from a thread without one
    runtime: Option<Handle>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, GetrError> {
        let client = Client::builder()
            .user_agent(concat!("getr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Use a preconfigured client (proxies, TLS roots, ...)
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            tasks: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(1),
            runtime: Handle::try_current().ok(),
        }
    }

    fn runtime(&self) -> Result<Handle, tokio::runtime::TryCurrentError> {
        match Handle::try_current() {
            Ok(current) => Ok(current),
            Err(e) => self.runtime.clone().ok_or(e),
        }
    }

    /// Number of tasks currently known to the transport
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Transport for HttpTransport {
    fn create_task(&self, request: TransportRequest, events: EventSink) -> Result<TaskKey, GetrError> {
        let key = TaskKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        let (control, _) = watch::channel(Control::Suspended);

        self.tasks.lock().insert(
            key,
            HttpTask {
                pending: Some((request, events)),
                control,
                handle: None,
            },
        );
        Ok(key)
    }

    fn resume(&self, key: TaskKey) {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(&key) else {
            return;
        };

        task.control.send_replace(Control::Running);

        if let Some((request, events)) = task.pending.take() {
            match self.runtime() {
                Ok(runtime) => {
                    let control = task.control.subscribe();
                    let client = self.client.clone();
                    task.handle = Some(runtime.spawn(run(client, request, events, control)));
                }
                Err(e) => events.failed(format!("No async runtime available: {}", e)),
            }
        }
    }

    fn suspend(&self, key: TaskKey) {
        if let Some(task) = self.tasks.lock().get(&key) {
            task.control.send_replace(Control::Suspended);
        }
    }

    fn cancel(&self, key: TaskKey) {
        if let Some(task) = self.tasks.lock().get_mut(&key) {
            task.pending = None;
            task.control.send_replace(Control::Canceled);
        }
    }

    fn release(&self, key: TaskKey) {
        if let Some(task) = self.tasks.lock().remove(&key) {
            task.control.send_replace(Control::Canceled);
            if let Some(handle) = task.handle {
                handle.abort();
            }
        }
    }
}

async fn run(client: Client, request: TransportRequest, events: EventSink, control: watch::Receiver<Control>) {
    let part = part_path(&request.destination);
    info!("Starting transfer {}: {}", events.id(), request.url);

    let outcome = tokio::select! {
        result = transfer(&client, &request, &events, control.clone()) => Some(result),
        _ = canceled(control) => None,
    };

    match outcome {
        Some(Ok(true)) => {
            info!("Transfer {} finished: {}", events.id(), request.destination.display());
            events.succeeded();
        }
        Some(Err(e)) => {
            warn!("Transfer {} failed: {}", events.id(), e);
            let _ = tokio::fs::remove_file(&part).await;
            events.failed(e.to_string());
        }
        Some(Ok(false)) | None => {
            debug!("Transfer {} canceled", events.id());
            let _ = tokio::fs::remove_file(&part).await;
        }
    }
}

/// Returns false when the transfer stopped because it was canceled
async fn transfer(
    client: &Client,
    request: &TransportRequest,
    events: &EventSink,
    mut control: watch::Receiver<Control>,
) -> Result<bool, GetrError> {
    let mut builder = client.get(request.url.clone()).timeout(request.timeout);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await?.error_for_status()?;
    let total = response.content_length();

    if let Some(parent) = request.destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part = part_path(&request.destination);
    let mut file = File::create(&part).await?;

    let mut received: u64 = 0;
    let mut stream = response.bytes_stream();

    loop {
        if !wait_while_suspended(&mut control).await {
            return Ok(false);
        }
        let Some(chunk) = stream.next().await else {
            break;
        };
        let chunk = chunk?;
        // A chunk that was in flight when the task got suspended is held
        // back until it resumes
        if !wait_while_suspended(&mut control).await {
            return Ok(false);
        }
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        events.progress(fraction(received, total), received, total);
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&part, &request.destination).await?;

    // Unknown lengths never hit received == total, so flush a final sample
    if total.is_none() {
        events.progress(1.0, received, Some(received));
    }

    Ok(true)
}

/// Returns false when the task was canceled while waiting
async fn wait_while_suspended(control: &mut watch::Receiver<Control>) -> bool {
    loop {
        let state = *control.borrow_and_update();
        match state {
            Control::Running => return true,
            Control::Canceled => return false,
            Control::Suspended => {}
        }
        if control.changed().await.is_err() {
            return false;
        }
    }
}

async fn canceled(mut control: watch::Receiver<Control>) {
    loop {
        if *control.borrow_and_update() == Control::Canceled {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}

fn fraction(received: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => received as f64 / total as f64,
        _ => 0.0,
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
