//! Generic "poll until ready or out of attempts" loop.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::abort::AbortToken;
use crate::catalog::JobPolling;
use crate::error::WizardResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollOptions {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on time spent waiting, rounded up to whole minutes.
    pub fn budget_minutes(&self) -> u64 {
        let total_ms = self.interval.as_millis() as u64 * self.max_attempts as u64;
        total_ms.div_ceil(60_000)
    }
}

impl From<JobPolling> for PollOptions {
    fn from(job: JobPolling) -> Self {
        Self::new(job.interval, job.max_attempts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
    /// A newer abort generation exists; the caller should return quietly.
    Aborted,
}

/// Wait `interval`, call `probe`, and repeat until it yields `Some`, the
/// attempt budget runs out, or `abort` goes stale.
///
/// The abort token is checked before and after every wait and after every
/// probe, so a stale loop never hands a result back to its caller. Errors
/// from `probe` end the loop immediately.
pub async fn poll_until<F, Fut, T>(
    options: PollOptions,
    abort: &AbortToken,
    mut probe: F,
) -> WizardResult<PollOutcome<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = WizardResult<Option<T>>>,
{
    for attempt in 1..=options.max_attempts {
        if abort.is_stale() {
            return Ok(PollOutcome::Aborted);
        }

        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                debug!(attempt, generation = abort.generation(), "Poll loop aborted while waiting");
                return Ok(PollOutcome::Aborted);
            }
            _ = tokio::time::sleep(options.interval) => {}
        }

        if abort.is_stale() {
            return Ok(PollOutcome::Aborted);
        }

        let ready = probe(attempt).await?;

        if abort.is_stale() {
            return Ok(PollOutcome::Aborted);
        }

        if let Some(value) = ready {
            return Ok(PollOutcome::Ready(value));
        }
    }

    Ok(PollOutcome::TimedOut {
        attempts: options.max_attempts,
    })
}
