use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Server-advertised request budget, as read from the `X-Ratelimit-*`
/// headers of a single response.
///
/// The zero value (`RateQuota::default()`) means the exchange never reached
/// the server or its headers could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateQuota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Computed locally from the other fields; the server never sends it.
    pub suggested_wait: DateTime<Utc>,
}

impl RateQuota {
    /// Builds a quota and derives `suggested_wait` relative to `now`.
    ///
    /// The remaining budget is spread evenly over the time left until reset.
    /// With nothing remaining the suggestion is the reset instant itself.
    pub fn new(limit: u32, remaining: u32, reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let window = (reset_at - now).max(chrono::TimeDelta::zero());
        let suggested_wait = if remaining == 0 {
            now + window
        } else {
            now + window / i32::try_from(remaining).unwrap_or(i32::MAX)
        };
        Self {
            limit,
            remaining,
            reset_at,
            suggested_wait,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Identifies one independent rate budget.
///
/// Upstream budgets are per endpoint and per credential. The credential only
/// contributes a hash so the key can be logged and kept around freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_endpoint(endpoint: &str, credential: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        credential.hash(&mut hasher);
        Self(format!("{}#{:016x}", endpoint, hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BucketKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn suggested_wait_spreads_budget() {
        let now = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        let reset = now + TimeDelta::seconds(60);
        let q = RateQuota::new(50, 6, reset, now);
        assert_eq!(q.suggested_wait, now + TimeDelta::seconds(10));
    }

    #[test]
    fn suggested_wait_with_no_budget_is_reset() {
        let now = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        let reset = now + TimeDelta::seconds(30);
        let q = RateQuota::new(50, 0, reset, now);
        assert_eq!(q.suggested_wait, reset);
    }

    #[test]
    fn suggested_wait_never_in_past() {
        let now = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        let q = RateQuota::new(50, 10, now - TimeDelta::seconds(5), now);
        assert_eq!(q.suggested_wait, now);
    }

    #[test]
    fn bucket_keys_separate_credentials_without_storing_them() {
        let a = BucketKey::for_endpoint("listings", "key-a");
        let b = BucketKey::for_endpoint("listings", "key-b");
        let c = BucketKey::for_endpoint("stall", "key-a");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, BucketKey::for_endpoint("listings", "key-a"));
        assert!(!a.as_str().contains("key-a"));
        assert!(a.as_str().starts_with("listings#"));
    }
}
