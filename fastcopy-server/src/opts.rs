use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{bail, Result, WrapErr};
use fastcopy_core::logging::{LogFormat, LogTarget};
use fastcopy_core::storage::StorageOpts;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use tracing::warn;
use url::Url;

/// Relays directories between storage clusters over HTTP.
#[derive(Debug, Parser)]
pub struct Args {
    /// Config file. Any key can be overridden by `FASTCOPY_<SECTION>__<KEY>` env vars.
    #[clap(short, long, env = "FASTCOPY_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Opts {
    /// Bind addresses.
    pub bind: Vec<String>,
    #[serde(default)]
    pub log: LogOpts,
    /// Storage this bridge lists and reads on `/copy`, and writes on `/upload`.
    pub storage: StorageOpts,
    #[serde(default)]
    pub transfer: TransferOpts,
    #[serde(default)]
    pub server: ServerOpts,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogOpts {
    pub target: LogTarget,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferOpts {
    /// Max number of files transferred at the same time, across all requests.
    pub concurrency: usize,
    /// Timeout of one file transfer. (seconds)
    pub request_timeout: u64,
    /// Ingress sink used when a copy request has no `targetURL`.
    pub default_target: Option<Url>,
}

impl Default for TransferOpts {
    fn default() -> Self {
        Self {
            concurrency: 8,
            request_timeout: 15 * 60,
            default_target: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerOpts {
    /// Time allowed for a client to send request headers. (seconds)
    pub client_request_timeout: u64,
    /// Keep-alive of idle connections. (seconds)
    pub keep_alive: u64,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self {
            client_request_timeout: 2 * 60,
            keep_alive: 5 * 60,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Opts> {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("FASTCOPY_").split("__"))
        .extract()
        .wrap_err_with(|| format!("Failed to load config: {}", path.display()))
}

pub fn validate_config(opts: &Opts) -> Result<()> {
    if opts.bind.is_empty() {
        bail!("At least one bind address must be configured");
    }
    if opts.transfer.concurrency == 0 {
        bail!("transfer.concurrency must be at least 1");
    }
    if opts.transfer.default_target.is_none() {
        warn!("No default target configured, copy requests must provide targetURL");
    }
    Ok(())
}
