//! servicegrid-queue — the batch queue subsystem as seen by ServiceGrid.
//!
//! `JobQueue` is the seam: a status query for a set of job ids and a
//! fire-and-forget cancel. `SlurmQueue` implements it by shelling out to
//! `squeue` and `scancel`.

pub mod error;
pub mod slurm;

use std::future::Future;

use servicegrid_state::{JobId, QueueJobStatus};

pub use error::{QueueError, QueueResult};
pub use slurm::{first_node, parse_squeue_output, parse_squeue_time, SlurmQueue};

/// Operations the health pass needs from the queue subsystem.
pub trait JobQueue: Send + Sync {
    /// Live status for `job_ids`. Ids the queue does not know are simply
    /// absent from the result.
    fn status(
        &self,
        job_ids: &[JobId],
    ) -> impl Future<Output = QueueResult<Vec<QueueJobStatus>>> + Send;

    /// Request termination of a job.
    fn cancel(&self, job_id: &str) -> impl Future<Output = QueueResult<()>> + Send;
}
