//! servicegrid-state — the service registry snapshot.
//!
//! The registry is a JSON document listing every `Service` and the
//! `ServiceJob`s submitted for it, in submission order. It is written by
//! the scheduling side of the cluster; this crate loads it read-only and
//! merges live queue status into the in-memory copy.
//!
//! # Architecture
//!
//! ```text
//! cluster.json ──load──▶ ServiceList
//!                          └── Service (id, health_check_script)
//!                                └── ServiceJob (job_id, ready, host, port, elapsed)
//! QueueJobStatus[] ──merge──▶ ServiceList   (ready/host/elapsed per job)
//! ```

pub mod error;
pub mod registry;
pub mod types;

pub use error::{StateError, StateResult};
pub use registry::MergeSummary;
pub use types::*;
