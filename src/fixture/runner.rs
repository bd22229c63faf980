use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

use super::TestContext;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Body,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => f.write_str("setup"),
            Phase::Body => f.write_str("test body"),
            Phase::Teardown => f.write_str("teardown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestOutcome {
    Passed,
    Failed { phase: Phase, message: String },
}

#[derive(Debug, Clone)]
pub struct TestReport {
    pub name: String,
    pub test_id: String,
    pub outcome: TestOutcome,
    /// Teardown error when an earlier phase already failed the test.
    pub teardown_error: Option<String>,
    pub duration: Duration,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    pub fn failure_message(&self) -> Option<&str> {
        match &self.outcome {
            TestOutcome::Passed => None,
            TestOutcome::Failed { message, .. } => Some(message),
        }
    }
}

/// A test case with setup, body and teardown phases.
#[async_trait]
pub trait TestCase: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, ctx: &mut TestContext) -> Result<()>;

    async fn run(&self, ctx: &mut TestContext) -> Result<()>;

    /// Must only undo what `ctx` records as done.
    async fn teardown(&self, ctx: &mut TestContext) -> Result<()>;
}

/// Run setup, then the body if setup passed, then teardown unconditionally.
///
/// The first failing phase decides the outcome; a teardown failure after an
/// earlier failure is kept in [`TestReport::teardown_error`].
pub async fn run_test_case<T>(case: &T, ctx: &mut TestContext) -> TestReport
where
    T: TestCase + ?Sized,
{
    let started = Instant::now();
    log::info!("Starting {} ({})", case.name(), ctx.test_id);

    let mut outcome = match case.setup(ctx).await {
        Ok(()) => match case.run(ctx).await {
            Ok(()) => TestOutcome::Passed,
            Err(e) => TestOutcome::Failed {
                phase: Phase::Body,
                message: e.to_string(),
            },
        },
        Err(e) => TestOutcome::Failed {
            phase: Phase::Setup,
            message: e.to_string(),
        },
    };

    let mut teardown_error = None;
    if let Err(e) = case.teardown(ctx).await {
        log::error!("Teardown of {} failed: {e}", ctx.test_id);
        if outcome == TestOutcome::Passed {
            outcome = TestOutcome::Failed {
                phase: Phase::Teardown,
                message: e.to_string(),
            };
        } else {
            teardown_error = Some(e.to_string());
        }
    }

    let report = TestReport {
        name: case.name().to_string(),
        test_id: ctx.test_id.clone(),
        outcome,
        teardown_error,
        duration: started.elapsed(),
    };

    match &report.outcome {
        TestOutcome::Passed => log::info!("{} passed in {:?}", report.name, report.duration),
        TestOutcome::Failed { phase, message } => {
            log::error!("{} failed during {phase}: {message}", report.name)
        }
    }
    report
}
