use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identifier assigned to a task at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file handed to the coordinator: original name plus its bytes.
///
/// `Bytes` is reference-counted, so cloning an `UploadFile` never copies
/// the content.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub contents: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        UploadFile {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    /// Read a local file; the base name becomes `file_name`.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(UploadFile::new(file_name, contents))
    }

    pub fn len(&self) -> u64 {
        self.contents.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// One submitted upload. Immutable after creation.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: TaskId,
    pub file: UploadFile,
}

impl UploadTask {
    pub fn file_name(&self) -> &str {
        &self.file.file_name
    }
}
