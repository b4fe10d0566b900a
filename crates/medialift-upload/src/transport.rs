//! The byte-moving side of an upload.
//!
//! The coordinator never touches the network itself: it hands each admitted
//! task to an [`UploadTransport`] and waits on the returned future, which it
//! drops to abort the transfer.

use bytes::Bytes;
use std::future::Future;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::task::UploadFile;

/// Bytes sent so far out of the request body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

impl TransferProgress {
    /// `loaded / total` scaled to 0–100; `None` when the total is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.loaded.min(self.total) as f64 / self.total as f64 * 100.0)
    }
}

/// Sink a transport reports byte progress into.
///
/// Reports are queued and drained by the task that owns the transfer, so
/// they may come from any thread (e.g. an HTTP connection task polling the
/// request body).
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<TransferProgress>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProgressReporter { tx }, rx)
    }

    pub fn report(&self, loaded: u64, total: u64) {
        // Receiver is gone once the transfer has finished; late reports are dropped
        let _ = self.tx.send(TransferProgress { loaded, total });
    }
}

pub trait UploadTransport: Send + Sync + 'static {
    /// Send `file` to the endpoint and return the 2xx response body.
    fn upload(
        &self,
        file: &UploadFile,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}
