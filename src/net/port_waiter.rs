use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::{Result, TesterError};
use crate::retry::{Deadline, WaitConfig};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Endpoint being probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(TesterError::InvalidTarget("host must not be empty".to_string()));
        }
        if port == 0 {
            return Err(TesterError::InvalidTarget(format!(
                "port must be in 1-65535 for host {host}"
            )));
        }
        Ok(Self { host, port })
    }

    /// Resolve the target once. Resolution failures are not retried.
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|source| TesterError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TesterError::Resolve {
                host: self.host.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses returned",
                ),
            });
        }
        Ok(addrs)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One bounded connection attempt across the resolved addresses.
///
/// Refused, unreachable and timed-out connects all count as "not open".
pub async fn probe(addrs: &[SocketAddr], connect_timeout: Duration) -> bool {
    for addr in addrs {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => return true,
            Ok(Err(e)) => log::debug!("Probe of {addr} failed: {e}"),
            Err(_) => log::debug!("Probe of {addr} timed out after {connect_timeout:?}"),
        }
    }
    false
}

/// Polls a TCP endpoint until it accepts connections or the budget runs out.
#[derive(Debug, Clone)]
pub struct PortWaiter {
    connect_timeout: Duration,
    wait: WaitConfig,
}

impl Default for PortWaiter {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            wait: WaitConfig::default(),
        }
    }
}

impl PortWaiter {
    pub fn new(connect_timeout: Duration, wait: WaitConfig) -> Self {
        Self {
            connect_timeout,
            wait,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns `Ok(true)` once a connection to `host:port` succeeds, `Ok(false)`
    /// when `timeout` passes without one.
    ///
    /// The deadline is fixed when the call starts, so the call returns within
    /// `timeout` plus one connect attempt. A host that cannot be resolved is an
    /// error rather than a retry.
    pub async fn wait_for_open_port(&self, host: &str, port: u16, timeout: Duration) -> Result<bool> {
        let target = Target::new(host, port)?;
        let deadline = Deadline::after(timeout);
        let addrs = target.resolve().await?;

        log::info!("Waiting up to {timeout:?} for {target} to accept connections");

        let mut attempt = 0u32;
        loop {
            if probe(&addrs, self.connect_timeout).await {
                log::info!("{target} is open after {} attempt(s)", attempt + 1);
                return Ok(true);
            }

            if deadline.is_expired() {
                log::warn!(
                    "{target} still closed after {} attempt(s) within {timeout:?}",
                    attempt + 1
                );
                return Ok(false);
            }

            let delay = self.wait.calculate_delay(attempt).min(deadline.remaining());
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn fast_waiter() -> PortWaiter {
        PortWaiter::new(
            Duration::from_millis(500),
            WaitConfig::fixed(Duration::from_millis(50)),
        )
    }

    #[test]
    fn test_target_validation() {
        assert!(Target::new("127.0.0.1", 9200).is_ok());
        assert!(matches!(
            Target::new("", 9200),
            Err(TesterError::InvalidTarget(_))
        ));
        assert!(matches!(
            Target::new("   ", 9200),
            Err(TesterError::InvalidTarget(_))
        ));
        assert!(matches!(
            Target::new("127.0.0.1", 0),
            Err(TesterError::InvalidTarget(_))
        ));
        assert_eq!(
            Target::new("10.0.0.5", 9200).unwrap().to_string(),
            "10.0.0.5:9200"
        );
    }

    #[tokio::test]
    async fn test_already_open_port_returns_quickly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let start = Instant::now();
        let open = fast_waiter()
            .wait_for_open_port("127.0.0.1", port, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(open);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_closed_port_times_out() {
        let port = closed_port().await;
        let waiter = fast_waiter();
        let timeout = Duration::from_millis(300);

        let start = Instant::now();
        let open = waiter
            .wait_for_open_port("127.0.0.1", port, timeout)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(!open);
        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(
            elapsed < timeout + waiter.connect_timeout() + Duration::from_secs(1),
            "overran budget: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_port_opening_mid_budget() {
        let port = closed_port().await;
        let waiter = fast_waiter();

        let opener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
            drop(listener);
        });

        let start = Instant::now();
        let open = waiter
            .wait_for_open_port("127.0.0.1", port, Duration::from_secs(3))
            .await
            .unwrap();

        assert!(open);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(2));
        opener.abort();
    }

    #[tokio::test]
    async fn test_huge_backoff_is_clamped_to_deadline() {
        let port = closed_port().await;
        let waiter = PortWaiter::new(
            Duration::from_millis(200),
            WaitConfig {
                strategy: crate::retry::WaitStrategy::Fixed,
                delay: Some(1e30),
                ..Default::default()
            },
        );

        let start = Instant::now();
        let open = waiter
            .wait_for_open_port("127.0.0.1", port, Duration::from_millis(300))
            .await
            .unwrap();

        assert!(!open);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_timeout_probes_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(fast_waiter()
            .wait_for_open_port("127.0.0.1", port, Duration::ZERO)
            .await
            .unwrap());

        let port = closed_port().await;
        assert!(!fast_waiter()
            .wait_for_open_port("127.0.0.1", port, Duration::ZERO)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_fatal() {
        let result = fast_waiter()
            .wait_for_open_port("no-such-host.invalid", 9200, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(TesterError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_invalid_port_is_rejected() {
        let result = fast_waiter()
            .wait_for_open_port("127.0.0.1", 0, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(TesterError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_probe_reports_refused_as_closed() {
        let port = closed_port().await;
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        assert!(!probe(&[addr], Duration::from_millis(500)).await);
    }
}
