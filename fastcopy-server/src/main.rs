#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::future_not_send,
    clippy::too_many_lines
)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::{NormalizePath, TrailingSlash};
use actix_web::{App, HttpServer};
use clap::Parser;
use eyre::Result;
use tokio::runtime::{Builder, Handle};
use tracing::info;
use tracing_actix_web::TracingLogger;
use url::Url;

use fastcopy_core::logging::{init_color_eyre, init_logger};
use fastcopy_core::storage::StorageGateway;

use crate::app::configure;
use crate::copy::{ConcurrencyLimiter, HttpRelay, Orchestrator};
use crate::metrics::init_metrics;
use crate::opts::{load_config, validate_config, Args, Opts};

mod app;
mod copy;
mod handler;
mod ingress;
mod metrics;
mod opts;
#[cfg(test)]
mod tests;
mod utils;

fn main() -> Result<()> {
    init_color_eyre()?;

    let args = Args::parse();
    let opts = load_config(&args.config)?;

    // Transfer tasks run here; actix workers only coordinate requests.
    let transfer_rt = Builder::new_multi_thread()
        .thread_name("fastcopy-transfer")
        .enable_all()
        .build()?;

    {
        // The TCP log writer needs a runtime to live on.
        let _guard = transfer_rt.enter();
        init_logger(opts.log.target.clone(), opts.log.format)?;
    }
    validate_config(&opts)?;

    actix_web::rt::System::new().block_on(serve(opts, transfer_rt.handle().clone()))
}

async fn serve(opts: Opts, transfer_rt: Handle) -> Result<()> {
    let metrics = init_metrics()?;

    let gateway = StorageGateway::from_opts(&opts.storage)?;
    let relay = HttpRelay::new(Duration::from_secs(opts.transfer.request_timeout))?;
    let orchestrator = Orchestrator::new(
        gateway.clone(),
        Arc::new(relay),
        ConcurrencyLimiter::new(opts.transfer.concurrency),
        transfer_rt,
    )
    .with_default_target(opts.transfer.default_target.clone());
    info!(
        concurrency = orchestrator.limiter().capacity(),
        default_target = ?opts.transfer.default_target.as_ref().map(Url::as_str),
        "transfer orchestrator ready"
    );

    let cfg = configure(gateway, orchestrator, Some(metrics));

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .wrap(TracingLogger::default())
            .configure(cfg.clone())
    })
    .client_request_timeout(Duration::from_secs(opts.server.client_request_timeout))
    .keep_alive(Duration::from_secs(opts.server.keep_alive));

    for bind in &opts.bind {
        server = server.bind(bind)?;
    }
    info!(bind = ?opts.bind, "fastcopy server listening");
    server.run().await?;

    Ok(())
}
