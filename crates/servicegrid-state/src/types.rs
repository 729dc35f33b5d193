//! Domain types for the service registry.
//!
//! These types mirror the registry's JSON document. Field defaults keep
//! older snapshots (written before a job was placed) loadable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Job identifier assigned by the queue subsystem.
pub type JobId = String;

/// Unique identifier for a service.
pub type ServiceId = String;

// ── Service ────────────────────────────────────────────────────────

/// A deployable unit, instantiated as one or more queue jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    /// Operator-supplied health check, invoked as `<path> <host:port> <id>`.
    #[serde(default)]
    pub health_check_script: Option<PathBuf>,
    /// Jobs in submission order.
    #[serde(default)]
    pub jobs: Vec<ServiceJob>,
}

// ── ServiceJob ─────────────────────────────────────────────────────

/// One running instance of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceJob {
    pub job_id: JobId,
    /// The job has reported a reachable host/port.
    #[serde(default)]
    pub ready: bool,
    /// Hostname; empty until the job is ready.
    #[serde(default)]
    pub host: String,
    /// Port allocated at submission; meaningful only when ready.
    #[serde(default)]
    pub port: u16,
    /// Time spent in the current queue state, in seconds.
    #[serde(default)]
    pub elapsed_secs: u64,
}

impl ServiceJob {
    /// A job that has been submitted but not yet placed.
    pub fn pending(job_id: impl Into<JobId>, port: u16) -> Self {
        Self {
            job_id: job_id.into(),
            ready: false,
            host: String::new(),
            port,
            elapsed_secs: 0,
        }
    }

    /// Ready with a known host. Says nothing about expiration.
    pub fn is_reachable(&self) -> bool {
        self.ready && !self.host.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs(self.elapsed_secs)
    }

    /// `host:port` as passed to health checks.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── ServiceList ────────────────────────────────────────────────────

/// The full registry snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceList {
    #[serde(default)]
    pub services: Vec<Service>,
}

// ── Queue status ───────────────────────────────────────────────────

/// Job state as reported by the queue subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueJobState {
    Pending,
    Running,
    Completing,
    /// Any terminal or unrecognised state.
    Other,
}

impl QueueJobState {
    pub fn from_slurm(s: &str) -> Self {
        match s.trim() {
            "PENDING" | "PD" => Self::Pending,
            "RUNNING" | "R" => Self::Running,
            "COMPLETING" | "CG" => Self::Completing,
            _ => Self::Other,
        }
    }
}

/// Live status of one job, as reported by a queue status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueJobStatus {
    pub job_id: JobId,
    pub state: QueueJobState,
    /// Node the job runs on, if placed.
    pub host: Option<String>,
    /// Time in the current state.
    pub elapsed: Duration,
}
