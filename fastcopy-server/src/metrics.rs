use actix_web::web::Data;
use actix_web::Responder;
use eyre::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const COUNTER_COPY_REQUESTS: &str = "copy_requests";
pub const COUNTER_COPY_FILES_COPIED: &str = "copy_files_copied";
pub const COUNTER_COPY_FILES_FAILED: &str = "copy_files_failed";
pub const COUNTER_COPY_BYTES_WRITTEN: &str = "copy_bytes_written";
pub const GAUGE_TRANSFERS_ACTIVE: &str = "copy_transfers_active";
pub const HISTOGRAM_COPY_ELAPSED: &str = "copy_elapsed_seconds";
pub const COUNTER_UPLOAD_REQUESTS: &str = "upload_requests";
pub const COUNTER_UPLOAD_BYTES_WRITTEN: &str = "upload_bytes_written";
pub const COUNTER_UPLOAD_FAILURES: &str = "upload_failures";

pub fn init_metrics() -> Result<PrometheusHandle> {
    describe_counter!(COUNTER_COPY_REQUESTS, "Copy requests that passed validation");
    describe_counter!(COUNTER_COPY_FILES_COPIED, "Files copied to an ingress sink");
    describe_counter!(COUNTER_COPY_FILES_FAILED, "Files that failed to copy");
    describe_counter!(
        COUNTER_COPY_BYTES_WRITTEN,
        Unit::Bytes,
        "Bytes of successfully copied files"
    );
    describe_gauge!(GAUGE_TRANSFERS_ACTIVE, "Transfer tasks holding a permit");
    describe_histogram!(
        HISTOGRAM_COPY_ELAPSED,
        Unit::Seconds,
        "Wall time of copy requests"
    );
    describe_counter!(COUNTER_UPLOAD_REQUESTS, "Upload requests that passed validation");
    describe_counter!(
        COUNTER_UPLOAD_BYTES_WRITTEN,
        Unit::Bytes,
        "Bytes persisted by uploads"
    );
    describe_counter!(COUNTER_UPLOAD_FAILURES, "Uploads that failed to persist");

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_boxed_recorder(Box::new(recorder))?;

    Ok(handle)
}

#[allow(clippy::unused_async)]
pub async fn metrics_handler(recorder: Data<PrometheusHandle>) -> impl Responder {
    recorder.render()
}
