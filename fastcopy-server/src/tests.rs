use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::web::{self, Data, Payload, Query};
use actix_web::{test, App, HttpResponse, HttpServer};
use futures::StreamExt;
use rstest::rstest;
use tokio::runtime::Handle;
use url::Url;

use fastcopy_core::logging::test_init_logger;
use fastcopy_core::storage::StorageGateway;
use fastcopy_core::tests::{
    file_content, memory_gateway, read_file, seed_files, unreachable_gateway,
};

use crate::app::configure;
use crate::copy::{ConcurrencyLimiter, HttpRelay, Orchestrator, TransferSummary};
use crate::handler::{upload_handler, UploadQuery};
use crate::ingress::UploadResponse;
use crate::utils::ReportWrapper;

const SOURCE_FILES: &[(&str, usize)] = &[
    ("a.txt", 1024),
    ("b.bin", 128 * 1024),
    ("c.bin", 300),
    ("d.log", 0),
    ("e.dat", 64 * 1024),
];

struct Rejects(Vec<String>);

/// Upload route of a sink that answers 503 for some file names.
async fn sink_upload(
    gateway: Data<StorageGateway>,
    rejects: Data<Rejects>,
    query: Query<UploadQuery>,
    mut payload: Payload,
) -> Result<HttpResponse, ReportWrapper> {
    let rejected = query
        .file_name
        .as_ref()
        .is_some_and(|name| rejects.0.contains(name));
    if rejected {
        while payload.next().await.is_some() {}
        return Ok(HttpResponse::ServiceUnavailable().body("sink is busy"));
    }
    upload_handler(gateway, query, payload).await
}

/// Run an ingress sink on a random local port.
fn spawn_sink(gateway: StorageGateway, rejects: &[&str]) -> (Url, ServerHandle) {
    let rejects = Data::new(Rejects(rejects.iter().map(ToString::to_string).collect()));
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(gateway.clone()))
            .app_data(rejects.clone())
            .route("/upload", web::post().to(sink_upload))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("bind sink");
    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    let url = format!("http://{addr}/upload").parse().expect("sink url");
    (url, handle)
}

fn orchestrator(gateway: StorageGateway, concurrency: usize) -> Orchestrator {
    let relay = HttpRelay::new(Duration::from_secs(30)).expect("relay");
    Orchestrator::new(
        gateway,
        Arc::new(relay),
        ConcurrencyLimiter::new(concurrency),
        Handle::current(),
    )
}

#[actix_web::test]
async fn must_copy_directory_through_sink() {
    test_init_logger();

    let source = memory_gateway();
    seed_files(&source, "/in", SOURCE_FILES).await;
    seed_files(&source, "/in/nested", &[("skipped", 10)]).await;

    let sink = memory_gateway();
    let (target, sink_handle) = spawn_sink(sink.clone(), &[]);

    let cfg = configure(source.clone(), orchestrator(source, 2), None);
    let app = test::init_service(
        App::new()
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .configure(cfg),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/copy?from=/in&to=/out&targetURL={target}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let summary: TransferSummary = test::read_body_json(resp).await;
    let total: usize = SOURCE_FILES.iter().map(|(_, size)| size).sum();
    assert_eq!(summary.from, "/in");
    assert_eq!(summary.to, "/out");
    assert_eq!(summary.files_requested, 5);
    assert_eq!(summary.files_copied, 5);
    assert_eq!(summary.written, total as u64);
    assert!(summary.copy_failures.is_empty());
    assert!(summary.elapsed_secs > 0.0);

    for (name, size) in SOURCE_FILES {
        assert_eq!(
            read_file(&sink, &format!("/out/{name}")).await,
            file_content(name, *size),
            "content of {name}"
        );
    }
    assert!(!sink
        .operator()
        .exists("/out/skipped")
        .await
        .expect("exists"));

    sink_handle.stop(false).await;
}

#[actix_web::test]
async fn must_report_rejected_files_with_summary() {
    test_init_logger();

    let source = memory_gateway();
    seed_files(&source, "/in", SOURCE_FILES).await;

    let sink = memory_gateway();
    let (target, sink_handle) = spawn_sink(sink.clone(), &["c.bin"]);

    let cfg = configure(source.clone(), orchestrator(source, 3), None);
    let app = test::init_service(App::new().configure(cfg)).await;

    let req = test::TestRequest::post()
        .uri(&format!("/copy?from=/in&to=/out&targetURL={target}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let summary: TransferSummary = test::read_body_json(resp).await;
    let copied: usize = SOURCE_FILES
        .iter()
        .filter(|(name, _)| *name != "c.bin")
        .map(|(_, size)| size)
        .sum();
    assert_eq!(summary.files_requested, 5);
    assert_eq!(summary.files_copied, 4);
    assert_eq!(summary.written, copied as u64);
    assert_eq!(summary.copy_failures.len(), 1);
    let failure = &summary.copy_failures[0];
    assert_eq!(failure.path, "/in/c.bin");
    assert_eq!(failure.size, 300);
    assert!(failure.reason.contains("503"), "reason: {}", failure.reason);

    assert!(!sink.operator().exists("/out/c.bin").await.expect("exists"));
    assert_eq!(
        read_file(&sink, "/out/e.dat").await,
        file_content("e.dat", 64 * 1024)
    );

    sink_handle.stop(false).await;
}

#[actix_web::test]
async fn must_fail_without_summary_if_listing_fails() {
    test_init_logger();

    let gateway = unreachable_gateway();
    let cfg = configure(gateway.clone(), orchestrator(gateway, 2), None);
    let app = test::init_service(App::new().configure(cfg)).await;

    let req = test::TestRequest::post()
        .uri("/copy?from=/in&to=/out&targetURL=http://127.0.0.1:1/upload")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = test::read_body(resp).await;
    assert!(serde_json::from_slice::<TransferSummary>(&body).is_err());
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("/in"), "body: {body}");
}

#[rstest]
#[case::copy_without_from("/copy?to=/out&targetURL=http://127.0.0.1:1/upload")]
#[case::copy_without_to("/copy?from=/in&targetURL=http://127.0.0.1:1/upload")]
#[case::copy_with_empty_from("/copy?from=&to=/out&targetURL=http://127.0.0.1:1/upload")]
#[case::copy_without_target("/copy?from=/in&to=/out")]
#[case::copy_with_bad_target("/copy?from=/in&to=/out&targetURL=ftp://host/upload")]
#[case::upload_without_to("/upload?fileName=a.txt")]
#[case::upload_without_file_name("/upload?to=/out")]
#[case::upload_with_nested_name("/upload?to=/out&fileName=../a.txt")]
#[actix_web::test]
async fn must_reject_invalid_requests(#[case] uri: &str) {
    test_init_logger();

    let gateway = memory_gateway();
    seed_files(&gateway, "/in", &[("a.txt", 16)]).await;
    let cfg = configure(gateway.clone(), orchestrator(gateway.clone(), 2), None);
    let app = test::init_service(App::new().configure(cfg)).await;

    let req = test::TestRequest::post()
        .uri(uri)
        .set_payload("payload")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    for path in ["/out/a.txt", "/a.txt"] {
        assert!(!gateway.operator().exists(path).await.expect("exists"));
    }
}

#[actix_web::test]
async fn must_write_upload() {
    test_init_logger();

    let gateway = memory_gateway();
    let cfg = configure(gateway.clone(), orchestrator(gateway.clone(), 2), None);
    let app = test::init_service(App::new().configure(cfg)).await;

    let req = test::TestRequest::post()
        .uri("/upload?to=/up&fileName=f.txt")
        .set_payload("hello bridge")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: UploadResponse = test::read_body_json(resp).await;
    assert_eq!(body.written, 12);
    assert_eq!(read_file(&gateway, "/up/f.txt").await, b"hello bridge");
}

#[actix_web::test]
async fn must_answer_health() {
    let gateway = memory_gateway();
    let cfg = configure(gateway.clone(), orchestrator(gateway, 1), None);
    let app = test::init_service(App::new().configure(cfg)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp, serde_json::json!({ "status": "200 OK" }));
}
