use actix_web::http::StatusCode;
use actix_web::web::{Data, Payload, Query};
use actix_web::HttpResponse;
use eyre::{eyre, Report};
use fastcopy_core::storage::StorageGateway;
use metrics::{counter, increment_counter};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::copy::{CopyError, Orchestrator};
use crate::ingress::{is_plain_file_name, write_stream};
use crate::metrics::{
    COUNTER_UPLOAD_BYTES_WRITTEN, COUNTER_UPLOAD_FAILURES, COUNTER_UPLOAD_REQUESTS,
};
use crate::utils::{ReportExt, ReportWrapper};

#[derive(Debug, Default, Deserialize)]
pub struct CopyQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "targetURL")]
    pub target_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub to: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
}

impl From<CopyError> for ReportWrapper {
    fn from(e: CopyError) -> Self {
        let status = match e {
            CopyError::Validation(_) => StatusCode::BAD_REQUEST,
            CopyError::Listing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Report::new(e).with_status(status)
    }
}

/// Copy every file of `from` to `to` through the ingress sink at `targetURL`.
///
/// Responds with the summary in both cases; 500 if any file failed.
pub async fn copy_handler(
    orchestrator: Data<Orchestrator>,
    query: Query<CopyQuery>,
) -> Result<HttpResponse, ReportWrapper> {
    let request = orchestrator.prepare(
        query.from.as_deref(),
        query.to.as_deref(),
        query.target_url.as_deref(),
    )?;

    let summary = orchestrator.run(&request).await.map_err(|e| {
        error!(error = %e, "copy request failed");
        e
    })?;

    if summary.is_complete() {
        info!(files_copied = summary.files_copied, "copied all files successfully");
        Ok(HttpResponse::Ok().json(summary))
    } else {
        warn!(
            files_failed = summary.copy_failures.len(),
            files_requested = summary.files_requested,
            "copy finished with failures"
        );
        Ok(HttpResponse::InternalServerError().json(summary))
    }
}

/// Persist the request body as `to/fileName`.
pub async fn upload_handler(
    gateway: Data<StorageGateway>,
    query: Query<UploadQuery>,
    payload: Payload,
) -> Result<HttpResponse, ReportWrapper> {
    let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
    let (Some(to), Some(file_name)) = (non_empty(&query.to), non_empty(&query.file_name)) else {
        return Err(eyre!("'to' and 'fileName' query params must be provided.")
            .with_status(StatusCode::BAD_REQUEST));
    };
    if !is_plain_file_name(&file_name) {
        return Err(
            eyre!("'fileName' must be a plain file name, got '{file_name}'")
                .with_status(StatusCode::BAD_REQUEST),
        );
    }

    increment_counter!(COUNTER_UPLOAD_REQUESTS);
    info!(%file_name, %to, "writing upload to target");
    match write_stream(&gateway, &to, &file_name, payload).await {
        Ok(resp) => {
            counter!(COUNTER_UPLOAD_BYTES_WRITTEN, resp.written);
            Ok(HttpResponse::Ok().json(resp))
        }
        Err(e) => {
            increment_counter!(COUNTER_UPLOAD_FAILURES);
            error!(error = %format!("{e:#}"), %file_name, %to, "error occurred writing upload");
            Err(e.into_resp_err())
        }
    }
}

#[allow(clippy::unused_async)]
pub async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "200 OK" }))
}
