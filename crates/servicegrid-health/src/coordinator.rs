//! One health pass, from lock acquisition to cancellation.
//!
//! ```text
//! Idle → AcquiringSchedLock → Refreshing → AcquiringHealthLock → Probing → Done
//!            │                    │                │
//!            └────────────────────┴────────────────┴──▶ Aborted
//! ```
//!
//! The scheduling lock covers only the registry load and queue refresh and
//! is released before the health lock is taken. Both locks are held through
//! guards, so every exit path releases whatever was acquired.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use servicegrid_core::{ConfigResult, ServiceGridConfig};
use servicegrid_lock::NamedLock;
use servicegrid_queue::JobQueue;
use servicegrid_state::ServiceList;

use crate::checker::HealthProbe;
use crate::error::CoordinatorResult;
use crate::expiration::ExpirationPolicy;

/// Where a pass is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    AcquiringSchedLock,
    Refreshing,
    AcquiringHealthLock,
    Probing,
    Done,
    Aborted,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassState::Idle => "idle",
            PassState::AcquiringSchedLock => "acquiring_sched_lock",
            PassState::Refreshing => "refreshing",
            PassState::AcquiringHealthLock => "acquiring_health_lock",
            PassState::Probing => "probing",
            PassState::Done => "done",
            PassState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a pass stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Another process holds the scheduling lock.
    SchedulingLockHeld,
    /// Another health pass holds the health lock.
    HealthLockHeld,
    /// Refresh failed.
    Failed(String),
}

/// Counters for a completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub probed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassSummary),
    Aborted {
        /// State the pass was in when it stopped.
        during: PassState,
        reason: AbortReason,
    },
}

impl PassOutcome {
    /// Terminal state of the pass.
    pub fn state(&self) -> PassState {
        match self {
            PassOutcome::Completed(_) => PassState::Done,
            PassOutcome::Aborted { .. } => PassState::Aborted,
        }
    }

    fn aborted(during: PassState, reason: AbortReason) -> Self {
        PassOutcome::Aborted { during, reason }
    }
}

/// Static inputs of a pass.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub registry_path: PathBuf,
    pub scheduling_lock: NamedLock,
    pub health_lock: NamedLock,
    pub expiration: ExpirationPolicy,
}

impl CoordinatorConfig {
    pub fn from_config(config: &ServiceGridConfig) -> ConfigResult<Self> {
        let stale = config.locks.stale_recovery;
        Ok(Self {
            registry_path: config.registry_path(),
            scheduling_lock: NamedLock::new("scheduling", config.locks.scheduling_path())
                .with_stale_recovery(stale),
            health_lock: NamedLock::new("health", config.locks.health_path())
                .with_stale_recovery(stale),
            expiration: ExpirationPolicy::new(config.health.expire_after()?),
        })
    }
}

/// Runs health passes against a queue with a prober.
pub struct HealthCoordinator<Q, P> {
    config: CoordinatorConfig,
    queue: Q,
    prober: P,
}

impl<Q: JobQueue, P: HealthProbe> HealthCoordinator<Q, P> {
    pub fn new(config: CoordinatorConfig, queue: Q, prober: P) -> Self {
        Self {
            config,
            queue,
            prober,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Run one full pass.
    pub async fn run_pass(&self) -> PassOutcome {
        debug!(state = %PassState::Idle, "performing health check on all active service jobs");

        debug!(state = %PassState::AcquiringSchedLock, "acquiring scheduling lock");
        let Some(sched_guard) = self.config.scheduling_lock.try_lock() else {
            warn!("scheduling routine is running, skipping health check");
            return PassOutcome::aborted(
                PassState::AcquiringSchedLock,
                AbortReason::SchedulingLockHeld,
            );
        };

        debug!(state = %PassState::Refreshing, registry = %self.config.registry_path.display(), "refreshing job state");
        let services = match self.refresh().await {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "error during health check refresh");
                // Dropping the guard releases the scheduling lock.
                return PassOutcome::aborted(PassState::Refreshing, AbortReason::Failed(e.to_string()));
            }
        };

        // The probe loop can take minutes; do not starve scheduling.
        sched_guard.release();

        debug!(state = %PassState::AcquiringHealthLock, "acquiring health lock");
        let Some(health_guard) = self.config.health_lock.try_lock() else {
            warn!("another health check is running, exiting");
            return PassOutcome::aborted(PassState::AcquiringHealthLock, AbortReason::HealthLockHeld);
        };

        debug!(state = %PassState::Probing, jobs = services.job_count(), "health check starting");
        let summary = self.probe_all(&services).await;

        health_guard.release();
        info!(
            state = %PassState::Done,
            probed = summary.probed,
            cancelled = summary.cancelled,
            skipped = summary.skipped,
            "health check completed"
        );
        PassOutcome::Completed(summary)
    }

    /// Load the registry and fold in live queue status.
    async fn refresh(&self) -> CoordinatorResult<ServiceList> {
        let mut services = ServiceList::load(&self.config.registry_path)?;
        let statuses = self.queue.status(&services.job_ids()).await?;
        let merge = services.update_from_queue(&statuses);
        debug!(updated = merge.updated, missing = merge.missing, "merged queue status");
        Ok(services)
    }

    /// Probe every eligible job in registry order and cancel failures.
    async fn probe_all(&self, services: &ServiceList) -> PassSummary {
        let mut summary = PassSummary::default();

        for service in &services.services {
            for job in &service.jobs {
                if !self.config.expiration.is_eligible(job) {
                    debug!(
                        job_id = %job.job_id,
                        service = %service.id,
                        ready = job.ready,
                        elapsed = ?job.elapsed(),
                        "skipping job"
                    );
                    summary.skipped += 1;
                    continue;
                }

                debug!(job_id = %job.job_id, host = %job.host, port = job.port, "checking health for ready job");
                summary.probed += 1;

                if self.prober.probe(service, job).await {
                    debug!(job_id = %job.job_id, host = %job.host, port = job.port, "job is healthy");
                    continue;
                }

                error!(
                    job_id = %job.job_id,
                    service = %service.id,
                    host = %job.host,
                    port = job.port,
                    "job is unhealthy, cancelling"
                );
                summary.cancelled += 1;
                if let Err(e) = self.queue.cancel(&job.job_id).await {
                    error!(job_id = %job.job_id, error = %e, "failed to cancel job");
                }
            }
        }

        summary
    }
}
