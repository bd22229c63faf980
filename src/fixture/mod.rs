mod context;
pub mod deploy;
pub mod event_timestamps;
mod runner;

pub use context::TestContext;
pub use deploy::Deployer;
pub use event_timestamps::{check_event_timestamps, EventTimestampFormatTest};
pub use runner::{run_test_case, Phase, TestCase, TestOutcome, TestReport};
