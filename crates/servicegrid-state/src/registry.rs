//! Loading the registry and folding queue status into it.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// Counts from one merge of queue status into the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Jobs found in the queue output.
    pub updated: usize,
    /// Registry jobs the queue no longer knows about.
    pub missing: usize,
}

impl ServiceList {
    /// Read the registry document at `path`.
    pub fn load(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| StateError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> StateResult<Self> {
        serde_json::from_str(json).map_err(|e| StateError::Deserialize(e.to_string()))
    }

    /// Every job id in the snapshot, in registry order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.services
            .iter()
            .flat_map(|s| s.jobs.iter().map(|j| j.job_id.clone()))
            .collect()
    }

    /// Total number of jobs across all services.
    pub fn job_count(&self) -> usize {
        self.services.iter().map(|s| s.jobs.len()).sum()
    }

    /// Apply the queue's view of each job.
    ///
    /// A job is ready only while the queue reports it running on a node.
    /// Jobs absent from `statuses` lose readiness. Statuses for ids not in
    /// the registry are ignored. Ports are never touched.
    pub fn update_from_queue(&mut self, statuses: &[QueueJobStatus]) -> MergeSummary {
        let by_id: HashMap<&str, &QueueJobStatus> = statuses
            .iter()
            .map(|s| (s.job_id.as_str(), s))
            .collect();

        let mut summary = MergeSummary::default();
        for service in &mut self.services {
            for job in &mut service.jobs {
                match by_id.get(job.job_id.as_str()) {
                    Some(status) => {
                        summary.updated += 1;
                        job.elapsed_secs = status.elapsed.as_secs();
                        match (&status.state, &status.host) {
                            (QueueJobState::Running, Some(host)) if !host.is_empty() => {
                                job.ready = true;
                                job.host = host.clone();
                            }
                            _ => {
                                job.ready = false;
                                job.host.clear();
                            }
                        }
                    }
                    None => {
                        summary.missing += 1;
                        debug!(job_id = %job.job_id, service = %service.id, "job not in queue");
                        job.ready = false;
                        job.host.clear();
                    }
                }
            }
        }
        summary
    }
}
