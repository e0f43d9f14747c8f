//! Bounded polling of values that an external service computes on demand.
//!
//! GitHub computes some fields asynchronously (a pull request's mergeability
//! is the prominent one): the first read may say "not yet known" and a later
//! read converges. [`poll_until_settled`] re-observes such a value a bounded
//! number of times and reports either the settled value or the last pending
//! observation, so callers can represent "could not determine" explicitly
//! instead of failing.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Number of observations made before giving up on a pending value.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Pause between two observations.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Marker error: the surrounding operation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// How often and how fast to re-observe a pending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    attempts: u32,
    interval: Duration,
}

impl PollBudget {
    /// Creates a budget of `attempts` observations `interval` apart.
    ///
    /// Returns `None` if `attempts` is zero.
    pub fn new(attempts: u32, interval: Duration) -> Option<Self> {
        if attempts == 0 {
            None
        } else {
            Some(Self { attempts, interval })
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// One observation of a value that may still be converging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The value is final.
    Settled(T),
    /// The value is still being computed; `T` is what was seen so far.
    Pending(T),
}

/// Final result of [`poll_until_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence<T> {
    /// The value settled after `attempts` observations.
    Settled { value: T, attempts: u32 },
    /// The budget ran out; `last` is the final pending observation.
    Exhausted { last: T, attempts: u32 },
}

/// Observes a value until it settles or the budget is spent.
///
/// `observe` receives the 1-based attempt number. An `Err` from `observe`
/// stops polling and is returned as-is. Cancellation is checked before every
/// attempt and interrupts the pause between attempts; it is reported through
/// the caller's error type.
pub async fn poll_until_settled<T, E, F, Fut>(
    budget: PollBudget,
    cancel: &CancellationToken,
    mut observe: F,
) -> Result<Convergence<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Observation<T>, E>>,
    E: From<Cancelled>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        match observe(attempt).await? {
            Observation::Settled(value) => {
                return Ok(Convergence::Settled {
                    value,
                    attempts: attempt,
                })
            }
            Observation::Pending(last) if attempt >= budget.attempts => {
                return Ok(Convergence::Exhausted {
                    last,
                    attempts: attempt,
                })
            }
            Observation::Pending(_) => {
                debug!(attempt, max_attempts = budget.attempts, "value not settled yet");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            _ = tokio::time::sleep(budget.interval) => {}
        }
        attempt += 1;
    }
}
