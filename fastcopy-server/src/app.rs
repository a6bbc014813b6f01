use actix_web::web;
use actix_web::web::{Data, ServiceConfig};
use fastcopy_core::storage::StorageGateway;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::copy::Orchestrator;
use crate::handler;
use crate::metrics::metrics_handler;

/// Routes and shared state of the bridge.
///
/// The returned closure is called once per worker. Shared state is cloned into each.
pub fn configure(
    gateway: StorageGateway,
    orchestrator: Orchestrator,
    metrics: Option<PrometheusHandle>,
) -> impl Fn(&mut ServiceConfig) + Clone {
    assert_hrtb(move |cfg| {
        cfg.app_data(Data::new(gateway.clone()))
            .app_data(Data::new(orchestrator.clone()))
            .route("/copy", web::post().to(handler::copy_handler))
            .route("/upload", web::post().to(handler::upload_handler))
            .route("/health", web::get().to(handler::health_handler));
        if let Some(metrics) = &metrics {
            cfg.app_data(Data::new(metrics.clone()))
                .route("/metrics", web::get().to(metrics_handler));
        }
    })
}

// Enforcing the HRTB is necessary to avoid a lifetime error.
const fn assert_hrtb<F: Fn(&mut ServiceConfig)>(f: F) -> F {
    f
}
