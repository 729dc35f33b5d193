//! Skip jobs the queue is about to reclaim.

use std::time::Duration;

use servicegrid_state::ServiceJob;

/// Jobs running for `expire_after` or longer are left alone: a probe could
/// race the queue's own teardown and cancel a job that is ending anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    expire_after: Duration,
}

impl ExpirationPolicy {
    pub fn new(expire_after: Duration) -> Self {
        Self { expire_after }
    }

    pub fn expire_after(&self) -> Duration {
        self.expire_after
    }

    pub fn about_to_expire(&self, job: &ServiceJob) -> bool {
        job.elapsed() >= self.expire_after
    }

    /// Ready, placed on a host, and not about to expire.
    pub fn is_eligible(&self, job: &ServiceJob) -> bool {
        job.is_reachable() && !self.about_to_expire(job)
    }
}
