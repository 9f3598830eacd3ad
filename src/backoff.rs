//! Caller-side retry. The dispatcher itself never retries.

use crate::client::Failure;
use crate::error::{Cancelled, DispatchError};
use log::warn;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failures that know whether repeating the exchange may help.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for DispatchError {
    fn is_retriable(&self) -> bool {
        DispatchError::is_retriable(self)
    }
}

impl<E> Retriable for Failure<E> {
    fn is_retriable(&self) -> bool {
        self.error.is_retriable()
    }
}

const FIRST_STEP_MS: u64 = 200;
const MAX_STEP_MS: u64 = 5_000;
const MAX_DOUBLINGS: u32 = 5;

/// Delay before retry number `attempt` (zero-based). A server-provided
/// `retry_after` is used as is; otherwise the step doubles per attempt up to
/// `MAX_STEP_MS` and a random point in its upper half is picked.
pub fn compute_backoff(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(d) = retry_after {
        return d;
    }
    let step = (FIRST_STEP_MS << attempt.min(MAX_DOUBLINGS)).min(MAX_STEP_MS);
    let half = step / 2;
    Duration::from_millis(half + fastrand::u64(0..=half))
}

/// Runs `op` up to `max_attempts` times, sleeping between retriable failures.
/// The last failure is returned once attempts run out.
pub async fn retry<T, Err, F, Fut>(
    max_attempts: u32,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<Result<T, Err>, Cancelled>
where
    Err: Retriable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Err>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(v) => return Ok(Ok(v)),
            Err(e) => e,
        };
        attempt += 1;
        if attempt >= max_attempts || !err.is_retriable() {
            return Ok(Err(err));
        }
        let backoff = compute_backoff(attempt - 1, None);
        warn!("attempt {} failed ({}), retrying in {:?}", attempt, err, backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => return Err(Cancelled),
        }
    }
}
