//! Multipart HTTP transport (reqwest).
//!
//! Each upload is a single `POST` with one `multipart/form-data` part
//! carrying the file bytes and its original name. The body is streamed in
//! `chunk_size` pieces so progress can be reported as it is consumed.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use std::future::Future;
use std::time::Duration;

use medialift_core::UploadConfig;

use crate::error::{TransportError, UploadError};
use crate::task::UploadFile;
use crate::transport::{ProgressReporter, UploadTransport};

/// Longest error body kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    form_field: String,
    chunk_size: usize,
    bearer_token: Option<String>,
}

impl HttpTransport {
    /// Build a transport from upload config.
    ///
    /// Only the endpoint URL is checked here; limits and the TLS policy are
    /// validated once, by [`UploadCoordinator::new`](crate::UploadCoordinator::new).
    pub fn from_config(cfg: &UploadConfig, bearer_token: Option<String>) -> Result<Self, UploadError> {
        let endpoint = Url::parse(&cfg.endpoint).map_err(|e| {
            UploadError::Config(format!("invalid upload endpoint '{}': {e}", cfg.endpoint))
        })?;

        let mut builder = Client::builder();
        if cfg.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(cfg.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| UploadError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpTransport {
            client,
            endpoint,
            form_field: cfg.form_field.clone(),
            chunk_size: cfg.chunk_size,
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl UploadTransport for HttpTransport {
    fn upload(
        &self,
        file: &UploadFile,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send {
        let total = file.len();
        let body = Body::wrap_stream(body_stream(file.contents.clone(), self.chunk_size, progress));
        let part = Part::stream_with_length(body, total).file_name(file.file_name.clone());
        let form = Form::new().part(self.form_field.clone(), part);

        let mut request = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let mut body = response.text().await.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            response.bytes().await.map_err(|e| TransportError::Body(e.to_string()))
        }
    }
}

/// Split `contents` into `chunk_size` slices, reporting cumulative bytes as
/// each slice is pulled by the HTTP client.
fn body_stream(
    contents: Bytes,
    chunk_size: usize,
    progress: ProgressReporter,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let total = contents.len() as u64;
    let chunks = split_chunks(&contents, chunk_size);
    futures::stream::iter(chunks).scan(0u64, move |sent, chunk| {
        *sent += chunk.len() as u64;
        progress.report(*sent, total);
        futures::future::ready(Some(Ok::<Bytes, std::io::Error>(chunk)))
    })
}

fn split_chunks(contents: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    (0..contents.len())
        .step_by(chunk_size)
        .map(|start| contents.slice(start..(start + chunk_size).min(contents.len())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_chunks_covers_everything() {
        let data = Bytes::from(vec![7u8; 10]);
        let chunks = split_chunks(&data, 4);
        let sizes: Vec<usize> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(split_chunks(&Bytes::new(), 4).is_empty());
    }

    #[tokio::test]
    async fn body_stream_reports_cumulative_progress() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let stream = body_stream(Bytes::from(vec![0u8; 10]), 4, reporter);
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 3);

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push((p.loaded, p.total));
        }
        assert_eq!(seen, vec![(4, 10), (8, 10), (10, 10)]);
    }

    #[test]
    fn from_config_rejects_bad_endpoint() {
        let cfg = UploadConfig {
            endpoint: "not a url".into(),
            ..Default::default()
        };
        let err = HttpTransport::from_config(&cfg, None).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
    }

    #[test]
    fn from_config_does_not_apply_tls_policy() {
        let cfg = UploadConfig {
            endpoint: "http://cms.local/upload".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let transport = HttpTransport::from_config(&cfg, None).unwrap();
        assert_eq!(transport.endpoint().scheme(), "http");
    }

    #[test]
    fn empty_token_is_dropped() {
        let transport = HttpTransport::from_config(&UploadConfig::default(), Some(String::new())).unwrap();
        assert!(transport.bearer_token.is_none());
        assert_eq!(transport.endpoint().path(), "/api/files/upload");
    }
}
