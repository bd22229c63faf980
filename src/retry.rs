use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound accepted for any configured delay.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Inter-attempt delay configuration shared by every polling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_strategy")]
    pub strategy: WaitStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>, // for fixed strategy
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
}

fn default_strategy() -> WaitStrategy {
    WaitStrategy::Exponential
}

fn default_initial_delay() -> f64 {
    0.1
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    Fixed,
    Exponential,       // Always deterministic
    ExponentialJitter, // Always has full jitter
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            strategy: WaitStrategy::Exponential,
            delay: None,
            initial_delay: 0.1,
            multiplier: 2.0,
            max_delay: 1.0,
        }
    }
}

impl WaitConfig {
    /// A constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        let secs = delay.as_secs_f64();
        Self {
            strategy: WaitStrategy::Fixed,
            delay: Some(secs),
            initial_delay: secs,
            multiplier: 1.0,
            max_delay: secs,
        }
    }

    pub fn calculate_delay(&self, attempt_number: u32) -> Duration {
        let delay_secs = match self.strategy {
            WaitStrategy::Fixed => self.delay.unwrap_or(self.initial_delay),
            WaitStrategy::Exponential => {
                let base_delay = self.initial_delay * self.multiplier.powi(attempt_number as i32);
                base_delay.min(self.max_delay)
            }
            WaitStrategy::ExponentialJitter => {
                let base_delay = self.initial_delay * self.multiplier.powi(attempt_number as i32);
                let capped_delay = base_delay.min(self.max_delay);

                if capped_delay.is_finite() {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(0.0..=capped_delay.max(0.0))
                } else {
                    capped_delay
                }
            }
        };

        // Out-of-range delays saturate; callers clamp to their own deadline.
        Duration::try_from_secs_f64(delay_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("multiplier must be a finite number >= 1".to_string());
        }

        check_delay("initial_delay", self.initial_delay)?;
        check_delay("max_delay", self.max_delay)?;
        if let Some(delay) = self.delay {
            check_delay("delay", delay)?;
        }

        Ok(())
    }
}

fn check_delay(name: &str, secs: f64) -> Result<(), String> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("{name} must be a finite number >= 0"));
    }
    if secs > MAX_DELAY_SECS {
        return Err(format!("{name} must be at most {MAX_DELAY_SECS} seconds"));
    }
    Ok(())
}

/// Absolute point in time after which polling stops.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// Run `check` until it yields a value or `timeout` elapses.
///
/// `check` always runs at least once, and once more right at the deadline if
/// the last sleep was cut short by it.
pub async fn poll_until<T, F, Fut>(timeout: Duration, wait: &WaitConfig, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Deadline::after(timeout);
    let mut attempt = 0u32;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }

        if deadline.is_expired() {
            return None;
        }

        let delay = wait.calculate_delay(attempt).min(deadline.remaining());
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
