use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MedialiftError, MedialiftResult};

/// Default number of transfers allowed to run at once.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

/// Task ids count up to this bound and then restart at 1.
pub const DEFAULT_ID_WRAP_BOUND: u64 = 1_000_000_000;

/// Top-level configuration (loaded from medialift.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedialiftConfig {
    pub upload: UploadConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload endpoint accepting multipart POSTs
    pub endpoint: String,
    /// Maximum number of concurrently active transfers (default: 4)
    pub concurrency_limit: usize,
    /// Task id wraparound bound (default: 1_000_000_000)
    pub id_wrap_bound: u64,
    /// Multipart field carrying the file bytes
    pub form_field: String,
    /// JSON response field naming the stored file
    pub response_field: String,
    /// Per-request timeout in seconds (default: 0, no timeout)
    pub request_timeout_secs: u64,
    /// Body chunk size in bytes; one progress report per chunk
    pub chunk_size: usize,
    /// Reject plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/files/upload".into(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            id_wrap_bound: DEFAULT_ID_WRAP_BOUND,
            form_field: "file".into(),
            response_field: "FileName".into(),
            request_timeout_secs: 0,
            chunk_size: 64 * 1024,
            enforce_tls: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl UploadConfig {
    /// Check the limits and the endpoint scheme.
    ///
    /// A plaintext endpoint is an error when `enforce_tls` is set and a
    /// warning otherwise.
    pub fn validate(&self) -> MedialiftResult<()> {
        if self.concurrency_limit == 0 {
            return Err(MedialiftError::Config(
                "upload.concurrency_limit must be at least 1".into(),
            ));
        }
        if self.id_wrap_bound == 0 {
            return Err(MedialiftError::Config(
                "upload.id_wrap_bound must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(MedialiftError::Config(
                "upload.chunk_size must be at least 1".into(),
            ));
        }
        if self.endpoint.starts_with("http://") {
            if self.enforce_tls {
                return Err(MedialiftError::Config(format!(
                    "upload endpoint uses plaintext HTTP ({}), but enforce_tls is enabled",
                    self.endpoint
                )));
            }
            tracing::warn!(
                endpoint = %self.endpoint,
                "upload endpoint uses plaintext HTTP; set upload.enforce_tls = true in production"
            );
        }
        Ok(())
    }
}

impl MedialiftConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. Callers decide whether a missing file is worth
    /// reporting; logging may not be initialized yet.
    pub fn load(path: &Path) -> MedialiftResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
