pub mod clients;
pub mod config;
pub mod error;
pub mod fixture;
pub mod net;
pub mod retry;
pub mod timestamp;

#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::{NetworkError, Result, TesterError};

// Search service defaults
pub const ELASTICSEARCH_PORT: u16 = 9200;
pub const EVENTS_INDEX: &str = "cloudify_events";

/// Upper bound for a single workflow execution.
pub const DEFAULT_EXECUTE_TIMEOUT_SECS: u64 = 1800;
