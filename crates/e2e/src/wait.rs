//! Poll-until-predicate with bounded exponential backoff
//!
//! The page under test updates its DOM on its own event-loop turn, so every
//! assertion re-resolves and re-checks until it holds or the deadline passes.
//! There is no fixed-sleep primitive.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Total time budget, measured from the first attempt
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Growth factor applied to the interval after each failed attempt
    pub multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(4),
            initial_interval: Duration::from_millis(25),
            max_interval: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl PollPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Grows by `multiplier`, saturating at `max_interval`
    fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Result of a single attempt
pub enum Attempt<T, O> {
    Done(T),
    /// Not yet; carries what was observed
    Retry(O),
}

/// Result of polling
#[derive(Debug)]
pub enum PollOutcome<T, O> {
    Done(T),
    TimedOut { last: O, attempts: u32, elapsed: Duration },
}

/// Run `attempt` until it reports `Done` or `policy.timeout` elapses.
///
/// At least one attempt is always made, and the last attempt happens at the
/// deadline rather than one interval before it. Errors returned by an attempt
/// abort polling immediately.
pub async fn poll_until<T, O, F, Fut>(policy: &PollPolicy, mut attempt: F) -> E2eResult<PollOutcome<T, O>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Attempt<T, O>>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut interval = policy.initial_interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match attempt().await? {
            Attempt::Done(value) => return Ok(PollOutcome::Done(value)),
            Attempt::Retry(last) => {
                let now = Instant::now();
                if now >= deadline {
                    let elapsed = now - start;
                    debug!("Gave up after {} attempt(s) in {:?}", attempts, elapsed);
                    return Ok(PollOutcome::TimedOut { last, attempts, elapsed });
                }
                sleep(interval.min(deadline - now)).await;
                interval = policy.next_interval(interval);
            }
        }
    }
}

/// Poll a boolean predicate; `Ok(false)` means it never held in time
pub async fn wait_for<F, Fut>(policy: &PollPolicy, mut predicate: F) -> E2eResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<bool>>,
{
    let outcome = poll_until(policy, || {
        let check = predicate();
        async move {
            Ok(if check.await? {
                Attempt::Done(())
            } else {
                Attempt::Retry(())
            })
        }
    })
    .await?;
    Ok(matches!(outcome, PollOutcome::Done(())))
}
