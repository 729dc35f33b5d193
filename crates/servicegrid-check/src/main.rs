//! servicegrid-check — one health pass over the cluster's service jobs.
//!
//! Meant to be run by a timer (cron, systemd timer) every few minutes.
//! Overlapping runs are serialised through lock files, so a run that finds
//! another one active exits straight away. Outcomes go to the log only;
//! the exit status is nonzero only when the configuration is unusable.
//!
//! # Usage
//!
//! ```text
//! servicegrid-check [--config servicegrid.toml] [--log-dir log]
//! ```

mod logging;

use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use servicegrid_core::ServiceGridConfig;
use servicegrid_health::{CoordinatorConfig, HealthCoordinator, Prober};
use servicegrid_queue::SlurmQueue;

#[derive(Parser)]
#[command(name = "servicegrid-check", about = "Probe running service jobs and cancel unhealthy ones", version)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist.
    #[arg(long, default_value = "servicegrid.toml")]
    config: PathBuf,

    /// Override the log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceGridConfig::load_or_default(&cli.config)?;
    if let Some(dir) = cli.log_dir {
        config.log.dir = dir;
    }
    logging::init(&config.log);
    debug!(config = %cli.config.display(), "configuration loaded");

    let queue = SlurmQueue::new(&config.queue.squeue, &config.queue.scancel)
        .with_user(config.queue.user.clone());
    let coordinator = HealthCoordinator::new(
        CoordinatorConfig::from_config(&config)?,
        queue,
        Prober::from_config(&config)?,
    );

    let outcome = coordinator.run_pass().await;
    debug!(state = %outcome.state(), "health pass finished");
    Ok(())
}
