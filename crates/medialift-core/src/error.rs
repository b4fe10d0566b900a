use thiserror::Error;

pub type MedialiftResult<T> = Result<T, MedialiftError>;

#[derive(Debug, Error)]
pub enum MedialiftError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
