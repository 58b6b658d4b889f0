//! Identifiers, error taxonomy, and operational configuration shared by
//! every other `sched-*` crate.

pub mod config;
pub mod error;
pub mod ids;

pub use config::{default_config_path, load_config, save_config, LoadPolicyKind, SchedulerConfig};
pub use error::SchedulerError;
pub use ids::{EngineId, TaskId};
