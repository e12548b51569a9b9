//! Bounded polling for asynchronous state transitions
//!
//! Used for VM boot and teardown, volume and image activation, SSH
//! readiness and cloud-init completion. A wait ends in one of three ways:
//! the probe reports the expected state (`Ok(true)`), the timeout elapses
//! (`Ok(false)`, logged as an error), or the probe fails (`Err`, returned
//! immediately without further polling).

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub const VM_BOOT_TIMEOUT: Duration = Duration::from_secs(900);
pub const VM_DELETE_TIMEOUT: Duration = Duration::from_secs(300);
pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(180);
pub const CLOUD_INIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const VOLUME_TIMEOUT: Duration = Duration::from_secs(300);
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Measured from the first check.
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Polls `probe` until it reports the expected state.
///
/// With `block == false` the probe runs exactly once and its answer is
/// returned as is.
pub async fn wait_for_state<F, Fut>(
    what: &str,
    block: bool,
    config: PollConfig,
    mut probe: F,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let mut polls = 0u32;
    loop {
        polls += 1;
        if probe().await? {
            debug!(what, polls, elapsed_ms = start.elapsed().as_millis() as u64, "State reached");
            return Ok(true);
        }
        if !block {
            return Ok(false);
        }
        if start.elapsed() >= config.timeout {
            error!(
                what,
                polls,
                timeout_secs = config.timeout.as_secs(),
                "Timeout waiting for state"
            );
            return Ok(false);
        }
        sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use snaps_core::ResourceKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports "done" on the `n`th poll.
    fn done_on(n: u32, polls: &AtomicU32) -> impl FnMut() -> std::future::Ready<Result<bool>> + '_ {
        move || {
            let current = polls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(current >= n))
        }
    }

    fn config(timeout_secs: u64) -> PollConfig {
        PollConfig::new(Duration::from_secs(timeout_secs)).with_interval(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_state_within_timeout() {
        let polls = AtomicU32::new(0);
        // Poll 3 happens at t=2s.
        let reached = wait_for_state("vm active", true, config(3), done_on(3, &polls))
            .await
            .unwrap();
        assert!(reached);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_before_enough_polls() {
        let polls = AtomicU32::new(0);
        let reached = wait_for_state("vm active", true, config(1), done_on(3, &polls))
            .await
            .unwrap();
        assert!(!reached);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_checks_once() {
        let polls = AtomicU32::new(0);
        let reached = wait_for_state("vm active", false, config(60), done_on(3, &polls))
            .await
            .unwrap();
        assert!(!reached);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_aborts_immediately() {
        let polls = AtomicU32::new(0);
        let result = wait_for_state("vm active", true, config(60), || {
            polls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(CloudError::creation(
                ResourceKind::VmInstance,
                "vm",
                "server entered ERROR state",
            )))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_matches_interval() {
        let polls = AtomicU32::new(0);
        let start = Instant::now();
        wait_for_state("volume available", true, config(30), done_on(5, &polls))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }
}
