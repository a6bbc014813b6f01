//! Ingress sink: persists an incoming byte stream into destination storage.

use std::pin::pin;

use bytes::Bytes;
use eyre::{Result, WrapErr};
use fastcopy_core::storage::StorageGateway;
use fastcopy_core::utils::join_path;
use futures::{Stream, StreamExt};
use opendal::Writer;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Response body of `/upload`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
    pub written: u64,
}

/// Whether `name` names a file directly inside the target directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Write `data` to `to/file_name`, creating `to` and replacing any existing file.
///
/// # Errors
/// Returns error if the directory or file can't be created, or the stream can't be read or
/// persisted completely. A partially written file is aborted.
pub async fn write_stream<S, E>(
    gateway: &StorageGateway,
    to: &str,
    file_name: &str,
    data: S,
) -> Result<UploadResponse>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    gateway
        .mkdir_all(to)
        .await
        .wrap_err_with(|| format!("Error creating directory {to}"))?;

    let path = join_path(to, file_name);
    let mut writer = gateway
        .open_write(&path)
        .await
        .wrap_err_with(|| format!("Error creating file {path}"))?;

    match copy_into(&mut writer, data).await {
        Ok(written) => {
            info!(%path, written, "file written");
            Ok(UploadResponse { path, written })
        }
        Err(e) => {
            if let Err(abort_err) = writer.abort().await {
                warn!(%path, %abort_err, "failed to abort partial write");
            }
            Err(e.wrap_err(format!("Error copying request body into file {path}")))
        }
    }
}

async fn copy_into<S, E>(writer: &mut Writer, data: S) -> Result<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut data = pin!(data);
    let mut written = 0;
    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        writer.write(chunk).await?;
    }
    writer.close().await?;
    Ok(written)
}
