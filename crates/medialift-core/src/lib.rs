pub mod config;
pub mod error;

pub use config::{LogConfig, MedialiftConfig, UploadConfig};
pub use error::{MedialiftError, MedialiftResult};
