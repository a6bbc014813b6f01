use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use fastcopy_core::storage::ByteStream;
use reqwest::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use url::Url;

use crate::copy::TransferError;
use crate::ingress::UploadResponse;

/// Destination of transfer tasks: something that persists a byte stream as `dest_dir/file_name`.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Stream `body` to the sink at `target`. Returns the byte count the sink persisted.
    async fn relay(
        &self,
        target: &Url,
        dest_dir: &str,
        file_name: &str,
        size: u64,
        body: ByteStream,
    ) -> Result<u64, TransferError>;
}

/// Relays files to a remote `/upload` endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
}

impl HttpRelay {
    /// `timeout` bounds a whole transfer, so it must fit the largest expected file.
    ///
    /// # Errors
    /// Returns error if the http client can't be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .pool_idle_timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn relay(
        &self,
        target: &Url,
        dest_dir: &str,
        file_name: &str,
        size: u64,
        body: ByteStream,
    ) -> Result<u64, TransferError> {
        let resp = self
            .client
            .post(target.clone())
            .query(&[("fileName", file_name), ("to", dest_dir)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONNECTION, "keep-alive")
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(TransferError::Send)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let uploaded: UploadResponse = resp
            .json()
            .await
            .map_err(|e| TransferError::Response(e.to_string()))?;
        Ok(uploaded.written)
    }
}
