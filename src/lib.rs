pub mod config;
pub mod error;
pub mod db;
pub mod host;
pub mod ingest;

pub use config::Config;
pub use error::{CronscanError, Result};
pub use host::HostIdentity;
pub use ingest::{run, RunSummary, ScanPlan, TaskEntry};
