//! Shared fixtures: a transport whose transfers finish only when a test says
//! so, and a subscriber that records every event.

#![allow(dead_code)]

use bytes::Bytes;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use medialift_core::UploadConfig;
use medialift_upload::{
    ProgressReporter, TaskId, TransportError, UploadCoordinator, UploadEventKind, UploadFile,
    UploadTaskEvent, UploadTransport,
};

struct Pending {
    file_name: String,
    reply: oneshot::Sender<Result<Bytes, TransportError>>,
    progress: ProgressReporter,
}

/// Transport whose uploads block until completed from the test.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pending: Arc<Mutex<Vec<Pending>>>,
    started: Arc<Mutex<Vec<String>>>,
}

impl UploadTransport for ScriptedTransport {
    fn upload(
        &self,
        file: &UploadFile,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send {
        let (reply, rx) = oneshot::channel();
        self.started.lock().unwrap().push(file.file_name.clone());
        self.pending.lock().unwrap().push(Pending {
            file_name: file.file_name.clone(),
            reply,
            progress,
        });
        async move {
            rx.await
                .unwrap_or_else(|_| Err(TransportError::Network("script dropped".into())))
        }
    }
}

impl ScriptedTransport {
    /// File names whose transfer has actually begun, in order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn pending_names(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.file_name.clone())
            .collect()
    }

    /// Wait until the transfer for `name` is running.
    pub async fn wait_started(&self, name: &str) {
        eventually(|| self.pending_names().iter().any(|n| n == name)).await;
    }

    fn take(&self, name: &str) -> Pending {
        let mut pending = self.pending.lock().unwrap();
        let idx = pending
            .iter()
            .position(|p| p.file_name == name)
            .unwrap_or_else(|| panic!("{name} is not in flight"));
        pending.remove(idx)
    }

    pub fn progress(&self, name: &str, loaded: u64, total: u64) {
        let pending = self.pending.lock().unwrap();
        let entry = pending
            .iter()
            .find(|p| p.file_name == name)
            .unwrap_or_else(|| panic!("{name} is not in flight"));
        entry.progress.report(loaded, total);
    }

    pub fn succeed(&self, name: &str, body: &str) {
        let _ = self.take(name).reply.send(Ok(Bytes::from(body.to_string())));
    }

    pub fn fail(&self, name: &str, err: TransportError) {
        let _ = self.take(name).reply.send(Err(err));
    }

    /// Complete the `idx`-th in-flight transfer (modulo the count) with a
    /// success body. Returns false when nothing is in flight.
    pub fn succeed_nth(&self, idx: usize) -> bool {
        let entry = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return false;
            }
            let len = pending.len();
            pending.remove(idx % len)
        };
        let body = format!(r#"{{"FileName":"srv-{}"}}"#, entry.file_name);
        let _ = entry.reply.send(Ok(Bytes::from(body)));
        true
    }
}

/// Records every event of every kind, in dispatch order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<UploadTaskEvent>>>,
}

impl Recorder {
    pub fn attach<T: UploadTransport>(coordinator: &UploadCoordinator<T>) -> Self {
        let recorder = Recorder::default();
        for kind in UploadEventKind::ALL {
            let events = Arc::clone(&recorder.events);
            coordinator.on(kind, move |event| events.lock().unwrap().push(event.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<UploadTaskEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn for_task(&self, id: TaskId) -> Vec<UploadEventKind> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id == id)
            .map(|e| e.kind)
            .collect()
    }

    pub fn position(&self, id: TaskId, kind: UploadEventKind) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| e.task_id == id && e.kind == kind)
    }

    pub fn started_ids(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == UploadEventKind::Start)
            .map(|e| e.task_id)
            .collect()
    }

    pub async fn wait_for(&self, id: TaskId, kind: UploadEventKind) -> UploadTaskEvent {
        eventually(|| self.position(id, kind).is_some()).await;
        self.events()
            .into_iter()
            .find(|e| e.task_id == id && e.kind == kind)
            .unwrap()
    }
}

/// Yield to spawned tasks until `cond` holds (5s cap).
pub async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

pub fn config(limit: usize) -> UploadConfig {
    UploadConfig {
        concurrency_limit: limit,
        ..Default::default()
    }
}

pub fn file(name: &str) -> UploadFile {
    UploadFile::new(name, name.as_bytes().to_vec())
}
