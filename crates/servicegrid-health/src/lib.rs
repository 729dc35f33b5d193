//! servicegrid-health — health checking for running service jobs.
//!
//! One invocation runs one pass. The pass refreshes the registry snapshot
//! under the scheduling lock, then probes every eligible job under the
//! separate health lock and cancels the ones that fail.
//!
//! # Architecture
//!
//! ```text
//! HealthCoordinator::run_pass
//!   ├── scheduling lock
//!   │   ├── ServiceList::load (registry)
//!   │   └── JobQueue::status → ServiceList::update_from_queue
//!   └── health lock
//!       └── for each service, for each job (registry order)
//!           ├── ExpirationPolicy::is_eligible
//!           ├── HealthProbe::probe
//!           │   ├── custom script (timeout, no fallback on timeout)
//!           │   └── http_probe (built-in, or fallback when the script
//!           │       cannot be run)
//!           └── JobQueue::cancel on unhealthy
//! ```
//!
//! Probing is sequential. A pass takes at most
//! `eligible_jobs × script_timeout`.

pub mod checker;
pub mod coordinator;
pub mod error;
pub mod expiration;

pub use checker::{Decision, HealthProbe, ProbeResult, Prober, ScriptOutcome};
pub use coordinator::{
    AbortReason, CoordinatorConfig, HealthCoordinator, PassOutcome, PassState, PassSummary,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use expiration::ExpirationPolicy;
