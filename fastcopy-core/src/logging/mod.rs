use std::panic::PanicHookInfo;
use std::{env, panic};

use eyre::Result;
use tracing::{error, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer};

pub use opts::{LogFormat, LogTarget, TargetWriter};

mod opts;
mod tcp;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

fn fmt_layer<S>(target: LogTarget, format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(target.into_make_writer());
    match format {
        LogFormat::Human => Box::new(layer),
        LogFormat::JSON => Box::new(layer.json()),
    }
}

fn log_panic(info: &PanicHookInfo) {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));

    error!(
        panic.payload = message,
        panic.location = info.location().map(ToString::to_string),
        panic.backtrace = ?backtrace::Backtrace::new(),
        "A panic occurred",
    );
}

/// Install the global subscriber and a panic hook that logs panics.
///
/// Logs go to stderr until `target` is set up, so a failing TCP connect is still reported.
/// Must be called within a tokio runtime context if `target` is a TCP socket, and after
/// color-eyre setup so its panic hook is chained.
///
/// # Errors
/// Returns error if a global subscriber is already installed.
pub fn init_logger(target: LogTarget, format: LogFormat) -> Result<()> {
    let (layer, reload_handle) = reload::Layer::new(fmt_layer(LogTarget::Stderr, format));

    tracing_subscriber::Registry::default()
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .with(layer)
        .try_init()?;

    if target != LogTarget::Stderr {
        reload_handle.reload(fmt_layer(target, format))?;
    }

    let prev_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        prev_hook(info);
    }));

    Ok(())
}

#[cfg(feature = "tests")]
pub fn test_init_logger() {
    drop(
        tracing_subscriber::Registry::default()
            .with(tracing::level_filters::LevelFilter::DEBUG)
            .with(ErrorLayer::default())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    );
}

/// Initialize color-eyre error handling, with `NO_COLOR` support.
///
/// # Errors
/// Returns an error if `color-eyre` has already been initialized.
pub fn init_color_eyre() -> Result<()> {
    if env::var("NO_COLOR").is_ok() {
        color_eyre::config::HookBuilder::new()
            .theme(color_eyre::config::Theme::new())
            .install()?;
    } else {
        color_eyre::install()?;
    }
    Ok(())
}
