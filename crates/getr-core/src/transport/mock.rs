//! Scripted in-memory transport for tests

use super::{EventSink, TaskKey, Transport, TransportRequest};
use crate::error::GetrError;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Resume,
    Suspend,
    Cancel,
    Release,
}

struct MockTask {
    request: TransportRequest,
    sink: EventSink,
    calls: Vec<Call>,
}

/// Records every control call and lets tests emit reports by download id
#[derive(Default)]
pub(crate) struct MockTransport {
    tasks: Mutex<HashMap<TaskKey, MockTask>>,
    next_key: Mutex<u64>,
    fail_create: Mutex<bool>,
}

impl MockTransport {
    pub(crate) fn fail_next_create(&self) {
        *self.fail_create.lock() = true;
    }

    pub(crate) fn sink(&self, id: Uuid) -> EventSink {
        self.find(id, |task| task.sink.clone())
    }

    pub(crate) fn request(&self, id: Uuid) -> TransportRequest {
        self.find(id, |task| task.request.clone())
    }

    pub(crate) fn calls(&self, id: Uuid) -> Vec<Call> {
        self.find(id, |task| task.calls.clone())
    }

    pub(crate) fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    fn find<T>(&self, id: Uuid, f: impl FnOnce(&MockTask) -> T) -> T {
        let tasks = self.tasks.lock();
        let task = tasks
            .values()
            .find(|task| task.sink.id() == id)
            .unwrap_or_else(|| panic!("no transport task for download {}", id));
        f(task)
    }

    fn record(&self, key: TaskKey, call: Call) {
        if let Some(task) = self.tasks.lock().get_mut(&key) {
            task.calls.push(call);
        }
    }
}

impl Transport for MockTransport {
    fn create_task(&self, request: TransportRequest, events: EventSink) -> Result<TaskKey, GetrError> {
        if std::mem::take(&mut *self.fail_create.lock()) {
            return Err(GetrError::Transport("task creation refused".to_string()));
        }

        let mut next = self.next_key.lock();
        *next += 1;
        let key = TaskKey(*next);
        self.tasks.lock().insert(
            key,
            MockTask {
                request,
                sink: events,
                calls: Vec::new(),
            },
        );
        Ok(key)
    }

    fn resume(&self, key: TaskKey) {
        self.record(key, Call::Resume);
    }

    fn suspend(&self, key: TaskKey) {
        self.record(key, Call::Suspend);
    }

    fn cancel(&self, key: TaskKey) {
        self.record(key, Call::Cancel);
    }

    fn release(&self, key: TaskKey) {
        self.record(key, Call::Release);
        self.tasks.lock().remove(&key);
    }
}
