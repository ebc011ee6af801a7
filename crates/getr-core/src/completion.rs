//! Completion signaling
//!
//! Every `start()` gets its own delivery task. Progress samples and the
//! terminal outcome travel through one ordered channel, so a callback never
//! sees a sample after its future has settled. Callbacks and settlement run
//! on the runtime that called `start()`, never on the transport's threads.

use crate::error::GetrError;
use getr_types::{CompletionEvent, ProgressEvent};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Caller-supplied sink for throttled progress samples
pub type ProgressCallback = Box<dyn FnMut(ProgressEvent) + Send + 'static>;

/// Successful outcome of a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub id: Uuid,
    pub path: PathBuf,
}

impl From<&CompletedDownload> for CompletionEvent {
    fn from(done: &CompletedDownload) -> Self {
        CompletionEvent::completed(done.path.clone())
    }
}

pub type CompletionResult = Result<CompletedDownload, GetrError>;

enum Delivery {
    Progress(ProgressEvent),
    Settle(CompletionResult),
}

/// Registry-side half of a completion. Settling consumes it, so a bound
/// completion can be settled at most once.
pub(crate) struct CompletionSignal {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl CompletionSignal {
    pub(crate) fn progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(Delivery::Progress(event));
    }

    pub(crate) fn settle(self, result: CompletionResult) {
        let _ = self.tx.send(Delivery::Settle(result));
    }
}

/// Bind a fresh completion pair, spawning its delivery task on `runtime`
pub(crate) fn bind(
    id: Uuid,
    callback: Option<ProgressCallback>,
    runtime: &Handle,
) -> (CompletionSignal, Completion) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    runtime.spawn(async move {
        let mut callback = callback;
        while let Some(delivery) = rx.recv().await {
            match delivery {
                Delivery::Progress(event) => {
                    if let Some(callback) = callback.as_mut() {
                        callback(event);
                    }
                }
                Delivery::Settle(result) => {
                    let _ = done_tx.send(result);
                    return;
                }
            }
        }
        // Signal dropped unsettled; the receiver sees a closed channel
    });

    (CompletionSignal { tx }, Completion { id, rx: done_rx })
}

/// Future returned by `start()`, resolving once with the terminal outcome
#[derive(Debug)]
pub struct Completion {
    id: Uuid,
    rx: oneshot::Receiver<CompletionResult>,
}

impl Completion {
    /// A completion that is already rejected or resolved
    pub(crate) fn settled(id: Uuid, result: CompletionResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { id, rx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for Completion {
    type Output = CompletionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(GetrError::Shutdown)),
        }
    }
}
