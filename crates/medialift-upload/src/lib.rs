//! medialift-upload: bounded-concurrency upload coordinator
//!
//! Components, leaves first:
//!   - `registry`: task id allocation with wraparound
//!   - `bus`: typed subscribe/unsubscribe event dispatch
//!   - `coordinator`: admission queue, active set, terminal handling
//!   - `transport` / `http`: the byte-moving side (multipart POST via reqwest)
//!   - `response`: validation of the endpoint's JSON reply

pub mod bus;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod http;
pub mod registry;
pub mod response;
pub mod task;
pub mod transport;

pub use bus::{EventBus, SubscriptionId, UploadCallback};
pub use coordinator::{CoordinatorSnapshot, UploadCoordinator, UploadStats};
pub use error::{ResponseError, TransportError, UploadError};
pub use event::{UploadEventKind, UploadTaskEvent, NO_PROGRESS};
pub use http::HttpTransport;
pub use task::{TaskId, UploadFile, UploadTask};
pub use transport::{ProgressReporter, TransferProgress, UploadTransport};
