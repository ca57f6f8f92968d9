//! TCP connect with bounded retry and a one-shot startup hook.
//!
//! Only refused connections are retried. The first refusal runs the startup
//! hook (typically launching the bridge server) instead of sleeping; later
//! refusals sleep the retry gap. Any other error fails immediately.

use std::io;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts (at least one is always made).
    pub retries: u32,
    pub retry_gap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_gap: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// `retries` attempts, sleeping `retry_gap` between refusals.
    pub fn new(retries: u32, retry_gap: Duration) -> Self {
        Self { retries, retry_gap }
    }

    /// Single attempt, no startup hook, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Connect to `host:port`.
pub fn connect<H>(host: &str, port: u16, policy: &RetryPolicy, startup: Option<H>) -> Result<TcpStream>
where
    H: FnOnce() -> Result<()>,
{
    let host = if host.is_empty() { "localhost" } else { host };
    let addr = format!("{host}:{port}");
    let stream = connect_with_retry(policy, &addr, |_| TcpStream::connect((host, port)), startup)?;
    tracing::info!(%addr, "Connected to bridge server");
    Ok(stream)
}

/// Retry loop behind [`connect`], generic over the attempt so it can be driven
/// without a network.
pub fn connect_with_retry<T, A, H>(
    policy: &RetryPolicy,
    addr: &str,
    mut attempt: A,
    mut startup: Option<H>,
) -> Result<T>
where
    A: FnMut(u32) -> io::Result<T>,
    H: FnOnce() -> Result<()>,
{
    let attempts = policy.retries.max(1);
    for n in 1..=attempts {
        tracing::debug!(addr, attempt = n, of = attempts, "Connecting");
        let err = match attempt(n) {
            Ok(conn) => return Ok(conn),
            Err(e) => e,
        };

        if err.kind() != io::ErrorKind::ConnectionRefused || n == attempts {
            return Err(BridgeError::ConnectFailed {
                addr: addr.to_owned(),
                attempts: n,
                source: err,
            });
        }

        if n == 1
            && let Some(hook) = startup.take()
        {
            tracing::debug!(addr, "Connection refused, running startup hook");
            hook()?;
        } else {
            tracing::debug!(addr, gap_ms = policy.retry_gap.as_millis() as u64, "Connection refused, retrying");
            thread::sleep(policy.retry_gap);
        }
    }

    // attempts >= 1, so the loop always returns.
    Err(BridgeError::ConnectFailed {
        addr: addr.to_owned(),
        attempts,
        source: io::ErrorKind::ConnectionRefused.into(),
    })
}
