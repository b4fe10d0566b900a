//! Task id allocation.
//!
//! Ids run 1, 2, 3, ... up to the wraparound bound and then restart at 1.
//! An id that is still outstanding (queued or active) is skipped, so a
//! long-running session can never hand out a duplicate.

use crate::error::UploadError;
use crate::task::TaskId;

#[derive(Debug)]
pub struct TaskRegistry {
    last: u64,
    bound: u64,
}

impl TaskRegistry {
    pub fn new(bound: u64) -> Self {
        TaskRegistry {
            last: 0,
            bound: bound.max(1),
        }
    }

    /// Allocate the next id for which `in_use` returns false.
    ///
    /// Fails only when every id in `1..=bound` is outstanding.
    pub fn next_id(&mut self, in_use: impl Fn(TaskId) -> bool) -> Result<TaskId, UploadError> {
        for _ in 0..self.bound {
            self.last = if self.last >= self.bound { 1 } else { self.last + 1 };
            let id = TaskId(self.last);
            if !in_use(id) {
                return Ok(id);
            }
            tracing::debug!(task_id = id.0, "skipping outstanding task id");
        }
        Err(UploadError::IdsExhausted { bound: self.bound })
    }
}
