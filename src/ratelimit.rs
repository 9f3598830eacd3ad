use crate::error::Cancelled;
use crate::types::{BucketKey, RateQuota};
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct BucketState {
    deadline: Option<Instant>,
    /// Held by one dispatch from its wait until its quota is recorded.
    gate: Arc<AsyncMutex<()>>,
}

/// Exclusive turn on a bucket, handed out by [`RateTracker::acquire`].
///
/// Same-key dispatches queue on the permit, so each one waits on the
/// deadline recorded by its predecessor. Dropping it lets the next one in.
#[derive(Debug)]
pub struct BucketPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Per-bucket send deadlines learned from server quota headers.
///
/// One tracker is meant to be shared (behind an `Arc`) by everything that
/// talks to the same API from one process. Buckets never block each other:
/// the map lock is only held for lookups and is released before any wait.
#[derive(Debug)]
pub struct RateTracker {
    buckets: Mutex<HashMap<BucketKey, BucketState>>,
    safety_margin: Duration,
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTracker {
    pub fn new() -> Self {
        Self::with_safety_margin(DEFAULT_SAFETY_MARGIN)
    }

    pub fn with_safety_margin(safety_margin: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            safety_margin,
        }
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    fn map(&self) -> MutexGuard<'_, HashMap<BucketKey, BucketState>> {
        // A panic while holding the guard cannot leave the map half-written.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the bucket's deadline with one derived from `quota` and
    /// returns the delay that was applied.
    pub fn record_observation(&self, key: &BucketKey, quota: &RateQuota) -> Duration {
        let delay = self.delay_for(quota);
        let deadline = Instant::now() + delay;
        self.map().entry(key.clone()).or_default().deadline = Some(deadline);
        debug!(
            "bucket {}: {}/{} remaining, reset at {}, next send in {:?}",
            key, quota.remaining, quota.limit, quota.reset_at, delay
        );
        delay
    }

    /// Spreads the time left until reset (minus the safety margin) evenly
    /// over the remaining budget.
    ///
    /// With zero remaining there is nothing to spread: the bucket waits for
    /// the whole reset window instead of dividing by zero.
    pub fn delay_for(&self, quota: &RateQuota) -> Duration {
        let until_reset = (quota.reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        if quota.remaining == 0 {
            return until_reset;
        }
        until_reset.saturating_sub(self.safety_margin) / quota.remaining
    }

    fn deadline(&self, key: &BucketKey) -> Option<Instant> {
        self.map().get(key).and_then(|b| b.deadline)
    }

    fn gate(&self, key: &BucketKey) -> Arc<AsyncMutex<()>> {
        self.map().entry(key.clone()).or_default().gate.clone()
    }

    /// Time left before the bucket may send again, without waiting.
    pub fn peek(&self, key: &BucketKey) -> Option<Duration> {
        let deadline = self.deadline(key)?;
        let left = deadline.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Suspends until the bucket's deadline has passed. Unknown buckets and
    /// expired deadlines return immediately.
    pub async fn wait(&self, key: &BucketKey, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let Some(deadline) = self.deadline(key) else {
            return Ok(());
        };
        if deadline <= Instant::now() {
            return Ok(());
        }
        debug!("bucket {}: waiting {:?}", key, deadline - Instant::now());
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Ok(()),
            _ = cancel.cancelled() => Err(Cancelled),
        }
    }

    /// Takes the bucket's turn, then waits out its deadline.
    ///
    /// Hold the permit until the response's quota has been recorded; a
    /// concurrent caller on the same key only starts waiting after that, on
    /// the fresh deadline. Other keys are unaffected.
    pub async fn acquire(
        &self,
        key: &BucketKey,
        cancel: &CancellationToken,
    ) -> Result<BucketPermit, Cancelled> {
        let gate = self.gate(key);
        let guard = tokio::select! {
            g = gate.lock_owned() => g,
            _ = cancel.cancelled() => return Err(Cancelled),
        };
        self.wait(key, cancel).await?;
        Ok(BucketPermit { _guard: guard })
    }

    pub fn forget(&self, key: &BucketKey) -> bool {
        self.map().remove(key).is_some()
    }

    /// Drops idle buckets whose deadline has already passed; returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.map();
        let before = map.len();
        map.retain(|_, b| {
            Arc::strong_count(&b.gate) > 1 || b.deadline.is_some_and(|d| d > now)
        });
        before - map.len()
    }

    pub fn tracked(&self) -> usize {
        self.map().len()
    }
}
