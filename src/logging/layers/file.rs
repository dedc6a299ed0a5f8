use crate::logging::config::LoggingConfig;
use crate::logging::layers::console::fmt_layer;
use crate::logging::layers::BoxLayer;
use crate::Result;
use anyhow::{anyhow, Context};
use dirs_next::home_dir;
use std::fs::{create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;

/// Determine the log file for a bridge instance.
///
/// Relative `log_dir` values resolve against `base_dir` (the config file's
/// directory) and fall back to `~/.agent-bridge/logs`.
pub fn log_file_path(
    config: &LoggingConfig,
    base_dir: Option<&Path>,
    instance: &str,
) -> Result<PathBuf> {
    let directory = match &config.log_dir {
        Some(custom) if custom.is_absolute() => custom.clone(),
        Some(custom) => match base_dir {
            Some(base) => base.join(custom),
            None => home_base()?.join(custom),
        },
        None => home_base()?.join(".agent-bridge").join("logs"),
    };
    Ok(directory.join(format!("{}.log", sanitize(instance))))
}

/// Build a layer that appends to `log_file` through a non-blocking writer.
pub fn file_layer<S>(
    log_file: &Path,
    config: &LoggingConfig,
) -> Result<(Option<BoxLayer<S>>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync + 'static,
{
    if !config.enable_file {
        return Ok((None, None));
    }

    ensure_log_dir(log_file)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let writer = BoxMakeWriter::new(non_blocking);
    Ok((Some(fmt_layer(writer, config.format)), Some(guard)))
}

fn ensure_log_dir(log_file: &Path) -> Result<()> {
    let directory = log_file.parent().ok_or_else(|| {
        anyhow!(
            "log file path {} has no parent directory",
            log_file.display()
        )
    })?;
    create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    Ok(())
}

fn home_base() -> Result<PathBuf> {
    home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable"))
}

fn sanitize(instance: &str) -> String {
    let cleaned: String = instance
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "agent-bridge".to_string()
    } else {
        cleaned
    }
}
