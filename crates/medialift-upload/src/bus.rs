//! Typed event bus for upload lifecycle notifications.
//!
//! Subscribers register per event kind and are called synchronously, in
//! registration order. Dispatch snapshots the subscriber list and releases
//! the lock before invoking anything, so a callback may itself subscribe,
//! unsubscribe, or call back into the coordinator.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event::{UploadEventKind, UploadTaskEvent};

pub type UploadCallback = Arc<dyn Fn(&UploadTaskEvent) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to remove that one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<UploadEventKind, Vec<(SubscriptionId, UploadCallback)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(
        &self,
    ) -> MutexGuard<'_, HashMap<UploadEventKind, Vec<(SubscriptionId, UploadCallback)>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for `kind`.
    pub fn on<F>(&self, kind: UploadEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&UploadTaskEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        tracing::debug!(event = %kind, subscription = id.0, "subscribed");
        id
    }

    /// Remove one registration. Returns false if it was not registered
    /// under `kind`.
    pub fn off(&self, kind: UploadEventKind, id: SubscriptionId) -> bool {
        let mut map = self.subscribers();
        let Some(list) = map.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(&kind);
        }
        removed
    }

    /// Remove every subscriber of `kind`.
    pub fn off_event(&self, kind: UploadEventKind) {
        self.subscribers().remove(&kind);
    }

    /// Remove every subscriber of every kind.
    pub fn off_all(&self) {
        self.subscribers().clear();
    }

    pub fn subscriber_count(&self, kind: UploadEventKind) -> usize {
        self.subscribers().get(&kind).map_or(0, Vec::len)
    }

    pub(crate) fn emit(&self, event: &UploadTaskEvent) {
        let callbacks: Vec<UploadCallback> = match self.subscribers().get(&event.kind) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };

        for callback in callbacks {
            // A panicking subscriber must not abort the coordinator's bookkeeping
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(
                    event = %event.kind,
                    task_id = event.task_id.0,
                    "upload event subscriber panicked"
                );
            }
        }
    }
}
