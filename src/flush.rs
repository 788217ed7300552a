//! Flush retry policy for views.
//!
//! Flushing a view can fail with a lock violation while the backing object's
//! journal is busy. Such failures are transient: a burst of immediate retries
//! usually clears them, and the rest clear after a short sleep.

use std::io;
use std::time::Duration;

use crate::errors::{MmapViewError, Result};

/// OS error code reported when a flush collides with a lock on the backing object.
#[cfg(windows)]
pub const LOCK_VIOLATION: i32 = 33; // ERROR_LOCK_VIOLATION

/// OS error code reported when a flush collides with a lock on the backing object.
#[cfg(not(windows))]
pub const LOCK_VIOLATION: i32 = libc::EBUSY;

/// Whether `err` is the transient lock-violation error.
#[must_use]
pub fn is_lock_violation(err: &io::Error) -> bool {
    err.raw_os_error() == Some(LOCK_VIOLATION)
}

/// Retry budget for flushes that fail with [`LOCK_VIOLATION`].
///
/// After a failed first attempt, each of `wait_rounds` rounds sleeps
/// `base_delay * 2^round` and then makes up to `retries_per_wait` immediate
/// attempts. The default (15 rounds of 20 retries, 1 ms doubling) sleeps at
/// most about 33 seconds in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRetry {
    /// Number of sleeping rounds.
    pub wait_rounds: u32,
    /// Immediate attempts per round.
    pub retries_per_wait: u32,
    /// Sleep before the first round; doubles each round.
    pub base_delay: Duration,
}

impl Default for FlushRetry {
    fn default() -> Self {
        Self {
            wait_rounds: 15,
            retries_per_wait: 20,
            base_delay: Duration::from_millis(1),
        }
    }
}

impl FlushRetry {
    /// Policy that surfaces the first lock violation without retrying.
    #[must_use]
    pub fn none() -> Self {
        Self {
            wait_rounds: 0,
            retries_per_wait: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Maximum number of flush calls this policy makes.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.wait_rounds
            .saturating_mul(self.retries_per_wait)
            .saturating_add(1)
    }

    fn delay(&self, round: u32) -> Duration {
        self.base_delay.saturating_mul(1u32.checked_shl(round).unwrap_or(u32::MAX))
    }

    /// Run `op` until it succeeds, fails with something other than a lock
    /// violation, or the budget is spent. Blocks the calling thread while sleeping.
    ///
    /// # Errors
    ///
    /// Returns `MmapViewError::Native` for any non-lock-violation failure, and
    /// `MmapViewError::FlushFailed` carrying the last lock violation once the
    /// budget is exhausted.
    pub fn run<F>(&self, mut op: F) -> Result<()>
    where
        F: FnMut() -> io::Result<()>,
    {
        let mut attempts = 1;
        let mut last = match op() {
            Ok(()) => return Ok(()),
            Err(e) => classify(e)?,
        };
        log::debug!("flush hit a lock violation, retrying");

        for round in 0..self.wait_rounds {
            std::thread::sleep(self.delay(round));
            for _ in 0..self.retries_per_wait {
                attempts += 1;
                match op() {
                    Ok(()) => return Ok(()),
                    Err(e) => last = classify(e)?,
                }
                std::hint::spin_loop();
            }
        }
        Err(exhausted(attempts, last))
    }

    /// Async counterpart of [`run`](Self::run): sleeps with `tokio::time::sleep`
    /// between rounds instead of blocking the thread. Not cancellation-aware
    /// beyond dropping the future between attempts.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    #[cfg(feature = "async")]
    pub async fn run_async<F>(&self, mut op: F) -> Result<()>
    where
        F: FnMut() -> io::Result<()>,
    {
        let mut attempts = 1;
        let mut last = match op() {
            Ok(()) => return Ok(()),
            Err(e) => classify(e)?,
        };
        log::debug!("flush hit a lock violation, retrying");

        for round in 0..self.wait_rounds {
            tokio::time::sleep(self.delay(round)).await;
            for _ in 0..self.retries_per_wait {
                attempts += 1;
                match op() {
                    Ok(()) => return Ok(()),
                    Err(e) => last = classify(e)?,
                }
                std::hint::spin_loop();
            }
        }
        Err(exhausted(attempts, last))
    }
}

/// Keep lock violations for another try; turn anything else into the final error.
fn classify(err: io::Error) -> Result<io::Error> {
    if is_lock_violation(&err) {
        Ok(err)
    } else {
        Err(MmapViewError::Native {
            operation: "flush view",
            source: err,
        })
    }
}

fn exhausted(attempts: u32, source: io::Error) -> MmapViewError {
    log::warn!("flush still lock-violated after {attempts} attempts, giving up");
    MmapViewError::FlushFailed { attempts, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast() -> FlushRetry {
        FlushRetry {
            base_delay: Duration::from_micros(1),
            ..FlushRetry::default()
        }
    }

    fn lock_violation() -> io::Error {
        io::Error::from_raw_os_error(LOCK_VIOLATION)
    }

    #[test]
    fn default_budget() {
        let retry = FlushRetry::default();
        assert_eq!(retry.max_attempts(), 301);
        let total: Duration = (0..retry.wait_rounds).map(|r| retry.delay(r)).sum();
        assert_eq!(total, Duration::from_millis(32_767));
    }

    #[test]
    fn succeeds_first_time_without_retry() {
        let mut calls = 0;
        fast()
            .run(|| {
                calls += 1;
                Ok(())
            })
            .expect("flush");
        assert_eq!(calls, 1);
    }

    #[test]
    fn transient_lock_violations_are_hidden() {
        // Spans several rounds: 1 initial call + 20 per round.
        let failures = 57;
        let mut calls = 0;
        fast()
            .run(|| {
                calls += 1;
                if calls <= failures {
                    Err(lock_violation())
                } else {
                    Ok(())
                }
            })
            .expect("flush should recover");
        assert_eq!(calls, failures + 1);
    }

    #[test]
    fn permanent_lock_violation_exhausts_budget() {
        let mut calls = 0u32;
        let started = Instant::now();
        let err = fast()
            .run(|| {
                calls += 1;
                Err(lock_violation())
            })
            .expect_err("must give up");
        assert_eq!(calls, 301);
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            MmapViewError::FlushFailed { attempts, source } => {
                assert_eq!(attempts, 301);
                assert!(is_lock_violation(&source));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let err = fast()
            .run(|| {
                calls += 1;
                Err(io::Error::from_raw_os_error(5))
            })
            .expect_err("must fail");
        assert_eq!(calls, 1);
        assert_eq!(err.os_code(), Some(5));
        assert!(matches!(err, MmapViewError::Native { operation: "flush view", .. }));
    }

    #[test]
    fn other_error_after_lock_violation_aborts() {
        let mut calls = 0;
        let err = fast()
            .run(|| {
                calls += 1;
                if calls < 4 {
                    Err(lock_violation())
                } else {
                    Err(io::Error::from_raw_os_error(5))
                }
            })
            .expect_err("must fail");
        assert_eq!(calls, 4);
        assert_eq!(err.os_code(), Some(5));
    }

    #[test]
    fn no_retry_policy_surfaces_first_violation() {
        let mut calls = 0;
        let err = FlushRetry::none()
            .run(|| {
                calls += 1;
                Err(lock_violation())
            })
            .expect_err("must fail");
        assert_eq!(calls, 1);
        assert_eq!(err.os_code(), Some(LOCK_VIOLATION));
    }
}
