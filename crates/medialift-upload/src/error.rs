use thiserror::Error;

/// Failure while moving bytes to the upload endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upload endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upload timed out")]
    Timeout,

    #[error("reading response body: {0}")]
    Body(String),
}

/// The endpoint answered 2xx but the reply is not a usable success marker.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response is missing the `{field}` field")]
    MissingFileName { field: String },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("upload transport panicked: {0}")]
    TransportPanicked(String),

    #[error("all task ids up to {bound} are outstanding")]
    IdsExhausted { bound: u64 },

    #[error("config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl From<medialift_core::MedialiftError> for UploadError {
    fn from(err: medialift_core::MedialiftError) -> Self {
        UploadError::Config(err.to_string())
    }
}
