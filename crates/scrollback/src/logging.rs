use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "SCROLLBACK_LOG";

pub fn init(log_file_path: &Path) -> Result<()> {
    let log_file = File::create(log_file_path)
        .with_context(|| format!("cannot create log file {}", log_file_path.display()))?;
    build_subscriber(log_file)
        .try_init()
        .context("a tracing subscriber is already installed")?;
    Ok(())
}

pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("debug"));
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
}
