use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens `<dir>/<name>.log` for appending; each pipeline run adds to it.
pub fn open_run_log(dir: &Path, name: &str) -> Result<File> {
    let path = dir.join(format!("{name}.log"));
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log {}", path.display()))
}

pub fn log_line(log: &mut File, message: &str, print: bool) -> Result<()> {
    if print {
        info!("{message}");
    }
    writeln!(log, "{message}")?;
    Ok(())
}

pub fn warn_line(log: &mut File, message: &str) -> Result<()> {
    warn!("{message}");
    writeln!(log, "WARNING: {message}")?;
    Ok(())
}
