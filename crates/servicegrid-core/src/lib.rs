//! servicegrid-core — static configuration for ServiceGrid.
//!
//! `servicegrid.toml` is optional: every section falls back to the
//! defaults of a stock cluster install. Durations are written as `5s`,
//! `500ms`, `9h30m` or clock form `9:30`, and are validated on load.

pub mod config;
pub mod duration;
pub mod error;

pub use config::ServiceGridConfig;
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
