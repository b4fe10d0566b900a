//! Lifecycle notifications emitted by the coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::task::{TaskId, UploadTask};

/// Progress value reported for events that carry no progress.
pub const NO_PROGRESS: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadEventKind {
    Start,
    Progress,
    Success,
    Failure,
    Cancellation,
}

impl UploadEventKind {
    pub const ALL: [UploadEventKind; 5] = [
        UploadEventKind::Start,
        UploadEventKind::Progress,
        UploadEventKind::Success,
        UploadEventKind::Failure,
        UploadEventKind::Cancellation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadEventKind::Start => "start",
            UploadEventKind::Progress => "progress",
            UploadEventKind::Success => "success",
            UploadEventKind::Failure => "failure",
            UploadEventKind::Cancellation => "cancellation",
        }
    }

    /// Success, failure and cancellation end a task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadEventKind::Success | UploadEventKind::Failure | UploadEventKind::Cancellation
        )
    }
}

impl fmt::Display for UploadEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UploadEventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown upload event: {s}"))
    }
}

/// Immutable record handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTaskEvent {
    pub kind: UploadEventKind,
    pub task_id: TaskId,
    pub file_name: String,
    /// 0–100 for start/progress, `None` otherwise
    pub progress: Option<f64>,
    /// Server-side name, set only on success
    pub uploaded_file_name: Option<String>,
    /// Failure description, set only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UploadTaskEvent {
    fn base(kind: UploadEventKind, task: &UploadTask) -> Self {
        UploadTaskEvent {
            kind,
            task_id: task.id,
            file_name: task.file_name().to_string(),
            progress: None,
            uploaded_file_name: None,
            reason: None,
        }
    }

    pub fn start(task: &UploadTask) -> Self {
        UploadTaskEvent {
            progress: Some(0.0),
            ..Self::base(UploadEventKind::Start, task)
        }
    }

    pub fn progress(task: &UploadTask, percent: f64) -> Self {
        UploadTaskEvent {
            progress: Some(percent),
            ..Self::base(UploadEventKind::Progress, task)
        }
    }

    pub fn success(task: &UploadTask, uploaded_file_name: String) -> Self {
        UploadTaskEvent {
            uploaded_file_name: Some(uploaded_file_name),
            ..Self::base(UploadEventKind::Success, task)
        }
    }

    pub fn failure(task: &UploadTask, reason: String) -> Self {
        UploadTaskEvent {
            reason: Some(reason),
            ..Self::base(UploadEventKind::Failure, task)
        }
    }

    pub fn cancellation(task: &UploadTask) -> Self {
        Self::base(UploadEventKind::Cancellation, task)
    }

    /// Progress with the `-1` sentinel for events that carry none.
    pub fn progress_or_sentinel(&self) -> f64 {
        self.progress.unwrap_or(NO_PROGRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::UploadFile;

    fn task() -> UploadTask {
        UploadTask {
            id: TaskId(7),
            file: UploadFile::new("logo.png", vec![1u8, 2, 3]),
        }
    }

    #[test]
    fn kind_names_parse_back() {
        for kind in UploadEventKind::ALL {
            assert_eq!(kind.as_str().parse::<UploadEventKind>().unwrap(), kind);
        }
        assert!("sucess".parse::<UploadEventKind>().is_err());
    }

    #[test]
    fn terminal_kinds() {
        assert!(!UploadEventKind::Start.is_terminal());
        assert!(!UploadEventKind::Progress.is_terminal());
        assert!(UploadEventKind::Success.is_terminal());
        assert!(UploadEventKind::Failure.is_terminal());
        assert!(UploadEventKind::Cancellation.is_terminal());
    }

    #[test]
    fn payload_conventions() {
        let t = task();
        assert_eq!(UploadTaskEvent::start(&t).progress_or_sentinel(), 0.0);
        assert_eq!(UploadTaskEvent::progress(&t, 42.5).progress_or_sentinel(), 42.5);

        let ok = UploadTaskEvent::success(&t, "a1b2.png".into());
        assert_eq!(ok.progress_or_sentinel(), NO_PROGRESS);
        assert_eq!(ok.uploaded_file_name.as_deref(), Some("a1b2.png"));

        let cancelled = UploadTaskEvent::cancellation(&t);
        assert_eq!(cancelled.progress_or_sentinel(), NO_PROGRESS);
        assert!(cancelled.uploaded_file_name.is_none());
    }

    #[test]
    fn serializes_as_json_line() {
        let json = serde_json::to_string(&UploadTaskEvent::failure(&task(), "boom".into())).unwrap();
        assert!(json.contains(r#""kind":"failure""#));
        assert!(json.contains(r#""task_id":7"#));
        assert!(json.contains(r#""reason":"boom""#));
    }
}
