//! Log sink setup: one file per month, stderr as a fallback.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use servicegrid_core::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let month = chrono::Local::now().format("%Y-%m").to_string();
    match open_log_file(&config.dir, &month) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!(dir = %config.dir.display(), error = %e, "could not open log file, logging to stderr");
        }
    }
}

/// `<dir>/scheduler-YYYY-MM.log`
pub fn log_file_path(dir: &Path, month: &str) -> PathBuf {
    dir.join(format!("scheduler-{month}.log"))
}

fn open_log_file(dir: &Path, month: &str) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(dir, month))
}
