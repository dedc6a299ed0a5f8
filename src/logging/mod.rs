pub mod config;
pub mod context;
pub mod layers;

pub use context::{detect_context, ExecutionContext};
pub use layers::console::{ConsoleFormat, ConsoleOutput};

use crate::cli::Command;
use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file, opentelemetry, BoxLayer};
use crate::Result;
use anyhow::{anyhow, Context};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use url::Url;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guards that keep logging sinks active for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    _otel_guard: Option<opentelemetry::OpenTelemetryGuard>,
}

/// Initialize logging for the provided CLI command.
///
/// `RUST_LOG` wins over `logging.default_level`. The console sink follows the
/// execution context; file and OpenTelemetry sinks are opt-in. Errors when
/// called more than once per process.
pub fn init(command: &Command, config_path: Option<&Path>, instance: &str) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let context = detect_context(command);
    let config = LoggingConfig::load(config_path)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let mut layers: Vec<BoxLayer<Registry>> = Vec::new();

    let console_output = console::select_console_output(context, config.console_output);
    if let Some(layer) = console::console_layer(console_output, config.format) {
        layers.push(layer);
    }

    let base_dir = config_path.and_then(Path::parent);
    let (log_file_path, file_guard) = if config.enable_file {
        let path = file::log_file_path(&config, base_dir, instance)?;
        let (layer, guard) = file::file_layer(&path, &config)?;
        layers.extend(layer);
        (Some(path), guard)
    } else {
        (None, None)
    };

    let mut otel_error = None;
    let otel_guard = match (
        config.opentelemetry.enabled,
        config.opentelemetry.endpoint.as_deref(),
    ) {
        (true, Some(endpoint)) => {
            let built = Url::parse(endpoint)
                .context("invalid OpenTelemetry endpoint")
                .and_then(|url| {
                    opentelemetry::build_opentelemetry_layer(
                        &url,
                        &config.opentelemetry.service_name,
                    )
                });
            match built {
                Ok((layer, guard)) => {
                    layers.push(layer);
                    Some(guard)
                }
                Err(err) => {
                    otel_error = Some(err);
                    None
                }
            }
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(err) = otel_error {
        tracing::warn!("OpenTelemetry disabled: {:#}", err);
    }
    tracing::debug!(
        context = ?context,
        console = %console_output,
        log_file = ?log_file_path,
        "logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
        _otel_guard: otel_guard,
    })
}
