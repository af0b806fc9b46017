//! Bounded, cancellable polling for freezer waits and the kill drain

use std::thread;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::error::{CgroupError, Result};
use super::types::PollPolicy;

/// Call `probe` until it returns `Ok(true)`
///
/// Per iteration: probe, then cancellation, then the deadline, then sleep.
/// A probe error ends the loop with that error.
pub fn poll_until<F>(
    policy: &PollPolicy,
    cancel: Option<&CancellationToken>,
    what: &str,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        if probe()? {
            trace!(what, attempts, "condition reached");
            return Ok(());
        }

        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(CgroupError::Cancelled(what.to_string()));
        }

        let elapsed = started.elapsed();
        if let Some(timeout) = policy.timeout {
            if elapsed >= timeout {
                return Err(CgroupError::Timeout {
                    what: what.to_string(),
                    elapsed,
                });
            }
        }

        trace!(what, attempts, "not yet, sleeping");
        if policy.interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(policy.interval);
        }
    }
}
