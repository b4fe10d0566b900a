//! Bounded-concurrency upload coordinator.
//!
//! Submitted tasks wait in a FIFO admission queue until a slot in the active
//! set frees up (default limit: 4). Every admitted task runs as its own Tokio
//! task driving the transport future; its progress and terminal events are
//! emitted from that task, after its `start` event, so per-task event order
//! holds on a multi-threaded runtime.
//!
//! Queue, active set and id registry sit behind a single mutex. Events are
//! always dispatched after the lock is released, so subscribers may call
//! `submit` / `cancel` from inside a callback.
//!
//! Admitted tasks pass through a launch queue before their `start` event is
//! emitted. One caller at a time drains it, so `start` events (and transport
//! calls) follow admission order even when transfers finish on different
//! worker threads. A slot freed by a terminal outcome is only launched after
//! that terminal event has been dispatched.

use bytes::Bytes;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use medialift_core::UploadConfig;

use crate::bus::{EventBus, SubscriptionId};
use crate::error::{TransportError, UploadError};
use crate::event::{UploadEventKind, UploadTaskEvent};
use crate::registry::TaskRegistry;
use crate::response::parse_upload_response;
use crate::task::{TaskId, UploadFile, UploadTask};
use crate::transport::{ProgressReporter, UploadTransport};

/// Running totals since the coordinator was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Point-in-time view of the queue (in admission order) and the active set
/// (sorted by id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorSnapshot {
    pub queued: Vec<TaskId>,
    pub active: Vec<TaskId>,
}

/// Handle to a coordinator. Clones share the same queue, active set and bus.
pub struct UploadCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for UploadCoordinator<T> {
    fn clone(&self) -> Self {
        UploadCoordinator {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    transport: T,
    runtime: Handle,
    concurrency_limit: usize,
    response_field: String,
    bus: EventBus,
    state: Mutex<CoordinatorState>,
    /// Queued + active count, for `wait_idle`
    outstanding: watch::Sender<usize>,
}

struct CoordinatorState {
    registry: TaskRegistry,
    queue: VecDeque<UploadTask>,
    active: HashMap<TaskId, ActiveTransfer>,
    /// Admitted tasks whose `start` has not been emitted yet
    launching: VecDeque<Launch>,
    /// Someone is draining `launching`
    launcher_busy: bool,
    /// Tasks already removed from queue/active whose terminal event is
    /// still being dispatched
    retiring: usize,
    stats: UploadStats,
}

impl CoordinatorState {
    fn outstanding(&self) -> usize {
        self.queue.len() + self.active.len() + self.retiring
    }
}

struct Launch {
    task: UploadTask,
    cancel: CancellationToken,
    /// False until the terminal event that freed this slot has been emitted
    released: bool,
}

/// An admitted task's abort handle.
struct ActiveTransfer {
    file_name: String,
    cancel: CancellationToken,
}

enum TransferOutcome {
    Succeeded(String),
    Failed(UploadError),
    Cancelled,
}

impl<T: UploadTransport> UploadCoordinator<T> {
    /// Validate `cfg` and bind the coordinator to the current Tokio runtime,
    /// which every transfer is spawned onto.
    pub fn new(cfg: &UploadConfig, transport: T) -> Result<Self, UploadError> {
        cfg.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            UploadError::Config(format!("upload coordinator needs a Tokio runtime: {e}"))
        })?;
        let (outstanding, _) = watch::channel(0);
        Ok(UploadCoordinator {
            inner: Arc::new(Inner {
                transport,
                runtime,
                concurrency_limit: cfg.concurrency_limit,
                response_field: cfg.response_field.clone(),
                bus: EventBus::new(),
                state: Mutex::new(CoordinatorState {
                    registry: TaskRegistry::new(cfg.id_wrap_bound),
                    queue: VecDeque::new(),
                    active: HashMap::new(),
                    launching: VecDeque::new(),
                    launcher_busy: false,
                    retiring: 0,
                    stats: UploadStats::default(),
                }),
                outstanding,
            }),
        })
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.concurrency_limit
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn on<F>(&self, kind: UploadEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&UploadTaskEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(kind, callback)
    }

    pub fn off(&self, kind: UploadEventKind, id: SubscriptionId) -> bool {
        self.inner.bus.off(kind, id)
    }

    pub fn off_event(&self, kind: UploadEventKind) {
        self.inner.bus.off_event(kind)
    }

    pub fn off_all(&self) {
        self.inner.bus.off_all()
    }

    /// Detach every subscriber, then abort all queued and active uploads.
    ///
    /// Subscribers are removed first so an owner being torn down is not
    /// notified of the resulting cancellations.
    pub fn teardown(&self) {
        self.off_all();
        self.cancel_all();
    }

    // ── Task control ──────────────────────────────────────────────────────────

    /// Queue `file` and admit as many queued tasks as capacity allows.
    ///
    /// Returns without waiting for any I/O. If a slot is free, the new task's
    /// `start` event is normally emitted before this returns; it is deferred
    /// to whoever is already launching when `submit` is called from a
    /// `start` callback or races another thread's launch.
    pub fn submit(&self, file: UploadFile) -> Result<TaskId, UploadError> {
        let id = {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            let queue = &state.queue;
            let active = &state.active;
            let id = state
                .registry
                .next_id(|id| active.contains_key(&id) || queue.iter().any(|t| t.id == id))?;

            debug!(
                task_id = id.0,
                file_name = %file.file_name,
                bytes = file.len(),
                "upload submitted"
            );
            state.queue.push_back(UploadTask { id, file });
            state.stats.submitted += 1;
            self.inner.admit(state, true);
            id
        };

        self.inner.launch_released();
        self.inner.publish_outstanding();
        Ok(id)
    }

    /// Cancel a queued or active task. Returns false for unknown ids.
    ///
    /// A queued task is dropped at once and its `cancellation` event is
    /// emitted before this returns. An active task has its transfer aborted;
    /// its `cancellation` event follows asynchronously, once the transfer
    /// task observes the abort.
    pub fn cancel(&self, id: TaskId) -> bool {
        let task = {
            let mut state = self.inner.state();
            if let Some(active) = state.active.get(&id) {
                info!(task_id = id.0, file_name = %active.file_name, "cancelling active upload");
                active.cancel.cancel();
                return true;
            }
            let position = state.queue.iter().position(|t| t.id == id);
            let Some(task) = position.and_then(|p| state.queue.remove(p)) else {
                return false;
            };
            state.stats.cancelled += 1;
            state.retiring += 1;
            task
        };

        info!(task_id = id.0, file_name = %task.file_name(), "queued upload cancelled");
        self.inner.bus.emit(&UploadTaskEvent::cancellation(&task));
        self.inner.retired(1);
        true
    }

    /// Cancel everything: queued tasks synchronously, active ones via abort.
    pub fn cancel_all(&self) {
        let drained: Vec<UploadTask> = {
            let mut state = self.inner.state();
            for active in state.active.values() {
                active.cancel.cancel();
            }
            let drained: Vec<UploadTask> = state.queue.drain(..).collect();
            state.stats.cancelled += drained.len() as u64;
            state.retiring += drained.len();
            drained
        };

        if !drained.is_empty() {
            info!(count = drained.len(), "queued uploads cancelled");
        }
        for task in &drained {
            self.inner.bus.emit(&UploadTaskEvent::cancellation(task));
        }
        self.inner.retired(drained.len());
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let state = self.inner.state();
        let mut active: Vec<TaskId> = state.active.keys().copied().collect();
        active.sort();
        CoordinatorSnapshot {
            queued: state.queue.iter().map(|t| t.id).collect(),
            active,
        }
    }

    pub fn stats(&self) -> UploadStats {
        self.inner.state().stats
    }

    pub fn is_idle(&self) -> bool {
        self.inner.state().outstanding() == 0
    }

    /// Resolve once nothing is queued or active and every terminal event has
    /// been delivered to its subscribers.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives as long as `inner`, so this cannot fail
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl<T: UploadTransport> Inner<T> {
    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_outstanding(&self) {
        let state = self.state();
        self.outstanding.send_replace(state.outstanding());
    }

    /// `n` terminal events counted in `retiring` have been dispatched.
    fn retired(&self, n: usize) {
        let mut state = self.state();
        state.retiring = state.retiring.saturating_sub(n);
        self.outstanding.send_replace(state.outstanding());
    }

    /// Move queued tasks into the active set while there is capacity and
    /// append them to the launch queue. Returns the admitted ids.
    fn admit(&self, state: &mut CoordinatorState, released: bool) -> Vec<TaskId> {
        let mut admitted = Vec::new();
        while state.active.len() < self.concurrency_limit {
            let Some(task) = state.queue.pop_front() else {
                break;
            };
            let cancel = CancellationToken::new();
            state.active.insert(
                task.id,
                ActiveTransfer {
                    file_name: task.file_name().to_string(),
                    cancel: cancel.clone(),
                },
            );
            info!(
                task_id = task.id.0,
                file_name = %task.file_name(),
                active = state.active.len(),
                queued = state.queue.len(),
                "upload admitted"
            );
            admitted.push(task.id);
            state.launching.push_back(Launch {
                task,
                cancel,
                released,
            });
        }
        admitted
    }

    /// Emit `start` and spawn the transfer for every released task at the
    /// head of the launch queue. Returns at once if another caller is
    /// already draining it.
    fn launch_released(self: &Arc<Self>) {
        {
            let mut state = self.state();
            if state.launcher_busy {
                return;
            }
            state.launcher_busy = true;
        }

        loop {
            let next = {
                let mut state = self.state();
                match state.launching.front() {
                    Some(launch) if launch.released => state.launching.pop_front(),
                    _ => {
                        state.launcher_busy = false;
                        None
                    }
                }
            };
            let Some(Launch { task, cancel, .. }) = next else {
                break;
            };
            self.bus.emit(&UploadTaskEvent::start(&task));
            self.runtime.spawn(Arc::clone(self).run_transfer(task, cancel));
        }
    }

    async fn run_transfer(self: Arc<Self>, task: UploadTask, cancel: CancellationToken) {
        let (reporter, mut progress_rx) = ProgressReporter::channel();

        let outcome = {
            let upload =
                AssertUnwindSafe(async { self.transport.upload(&task.file, reporter).await })
                    .catch_unwind();
            tokio::pin!(upload);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break TransferOutcome::Cancelled,
                    Some(progress) = progress_rx.recv() => {
                        if let Some(percent) = progress.percent() {
                            trace!(task_id = task.id.0, loaded = progress.loaded, total = progress.total, "upload progress");
                            self.bus.emit(&UploadTaskEvent::progress(&task, percent));
                        }
                    }
                    result = &mut upload => break match result {
                        Ok(result) => self.classify(result),
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            error!(task_id = task.id.0, file_name = %task.file_name(), panic = %message, "upload transport panicked");
                            TransferOutcome::Failed(UploadError::TransportPanicked(message))
                        }
                    },
                }
            }
        };

        self.finish(task, outcome);
    }

    fn classify(&self, result: Result<Bytes, TransportError>) -> TransferOutcome {
        let uploaded = result.map_err(UploadError::from).and_then(|body| {
            parse_upload_response(&body, &self.response_field).map_err(UploadError::from)
        });
        match uploaded {
            Ok(name) => TransferOutcome::Succeeded(name),
            Err(err) => TransferOutcome::Failed(err),
        }
    }

    /// Retire a finished transfer, report it, then launch whatever took its
    /// slot.
    fn finish(self: &Arc<Self>, task: UploadTask, outcome: TransferOutcome) {
        let admitted = {
            let mut state = self.state();
            state.active.remove(&task.id);
            match &outcome {
                TransferOutcome::Succeeded(_) => state.stats.succeeded += 1,
                TransferOutcome::Failed(_) => state.stats.failed += 1,
                TransferOutcome::Cancelled => state.stats.cancelled += 1,
            }
            state.retiring += 1;
            self.admit(&mut state, false)
        };

        let event = match outcome {
            TransferOutcome::Succeeded(uploaded) => {
                info!(task_id = task.id.0, file_name = %task.file_name(), uploaded = %uploaded, "upload succeeded");
                UploadTaskEvent::success(&task, uploaded)
            }
            TransferOutcome::Failed(err) => {
                warn!(task_id = task.id.0, file_name = %task.file_name(), error = %err, "upload failed");
                UploadTaskEvent::failure(&task, err.to_string())
            }
            TransferOutcome::Cancelled => {
                info!(task_id = task.id.0, file_name = %task.file_name(), "active upload cancelled");
                UploadTaskEvent::cancellation(&task)
            }
        };
        self.bus.emit(&event);

        if !admitted.is_empty() {
            let mut state = self.state();
            for launch in state.launching.iter_mut() {
                if admitted.contains(&launch.task.id) {
                    launch.released = true;
                }
            }
        }
        self.launch_released();
        self.retired(1);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}
