//! Exponential backoff with a cap, shared by the message store, task store,
//! and message hub recovery loop.
//!
//! Pure and stateless: a [`RetryPolicy`] is a value type, and every method on
//! it is a plain computation over its inputs — there is nothing here to mock
//! out in a test.

#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything that can be retried: a spooled message, an async task, a pending
/// delivery. The policy only needs to know whether the item has already
/// succeeded (acked), whether it has a hard deadline (expiry), and how many
/// attempts have already been made.
pub trait Retryable {
    /// `true` once the item has been acknowledged; acked items are never retried.
    fn acked(&self) -> bool;
    /// `true` once `now` is past the item's expiry, if it has one.
    fn expired(&self, now: DateTime<Utc>) -> bool;
    /// Number of retry attempts made so far.
    fn retry_count(&self) -> u32;
    /// When the item was created.
    fn created_at(&self) -> DateTime<Utc>;
    /// When the item was last retried, if ever.
    fn last_retry_at(&self) -> Option<DateTime<Utc>>;
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.0
}

/// Exponential backoff configuration: `delay(k) = min(initial * multiplier^k, max)`,
/// optionally randomized by `±jitter_factor` to avoid many retry-eligible
/// items waking up at the exact same instant (thundering herd).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed before an item is no longer retry-eligible. Default 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (attempt 0). Default 1s.
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    /// Upper bound on the computed delay, regardless of attempt count. Default 30s.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Growth factor applied per attempt. Default 2.0.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Randomize the computed delay by `±jitter_factor` (e.g. 0.1 = ±10%).
    /// Default 0 (disabled) — plain exponential backoff.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the backoff for 0-indexed attempt `k`: `min(initial * multiplier^k, max)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = self.initial_backoff_secs as f64;
        let max = self.max_backoff_secs as f64;
        let raw = initial * self.backoff_multiplier.powi(attempt.min(1000) as i32);
        let capped = raw.min(max).max(0.0);

        let delay_secs = if self.jitter_factor > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::random::<f64>().mul_add(2.0 * jitter_range, -jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay_secs)
    }

    /// Whether `item` is still eligible for another retry: not acked, not
    /// expired, and under the attempt ceiling.
    pub fn should_retry<T: Retryable>(&self, item: &T) -> bool {
        if item.acked() {
            return false;
        }
        if item.expired(Utc::now()) {
            return false;
        }
        item.retry_count() < self.max_retries
    }

    /// When `item`'s next retry is due: `(last_retry_at ?? created_at) + backoff(retry_count)`.
    #[must_use]
    pub fn next_retry_time<T: Retryable>(&self, item: &T) -> DateTime<Utc> {
        let base = item.last_retry_at().unwrap_or_else(|| item.created_at());
        let backoff = self.backoff(item.retry_count());
        base + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        acked: bool,
        expires_at: Option<DateTime<Utc>>,
        retry_count: u32,
        created_at: DateTime<Utc>,
        last_retry_at: Option<DateTime<Utc>>,
    }

    impl Retryable for Item {
        fn acked(&self) -> bool {
            self.acked
        }
        fn expired(&self, now: DateTime<Utc>) -> bool {
            self.expires_at.is_some_and(|e| e <= now)
        }
        fn retry_count(&self) -> u32 {
            self.retry_count
        }
        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }
        fn last_retry_at(&self) -> Option<DateTime<Utc>> {
            self.last_retry_at
        }
    }

    fn fresh_item(retry_count: u32) -> Item {
        Item {
            acked: false,
            expires_at: None,
            retry_count,
            created_at: Utc::now(),
            last_retry_at: None,
        }
    }

    #[test]
    fn backoff_matches_documented_arithmetic() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(100), Duration::from_secs(30));
    }

    #[test]
    fn should_retry_false_once_over_max_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&fresh_item(0)));
        assert!(policy.should_retry(&fresh_item(2)));
        assert!(!policy.should_retry(&fresh_item(3)));
        assert!(!policy.should_retry(&fresh_item(10)));
    }

    #[test]
    fn should_retry_false_once_acked() {
        let policy = RetryPolicy::default();
        let mut item = fresh_item(0);
        item.acked = true;
        assert!(!policy.should_retry(&item));
    }

    #[test]
    fn should_retry_false_once_expired() {
        let policy = RetryPolicy::default();
        let mut item = fresh_item(0);
        item.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!policy.should_retry(&item));
    }

    #[test]
    fn next_retry_time_uses_last_retry_at_when_present() {
        let policy = RetryPolicy::default();
        let created = Utc::now() - chrono::Duration::seconds(100);
        let last_retry = Utc::now() - chrono::Duration::seconds(5);
        let item = Item {
            acked: false,
            expires_at: None,
            retry_count: 1,
            created_at: created,
            last_retry_at: Some(last_retry),
        };
        let next = policy.next_retry_time(&item);
        assert_eq!(next, last_retry + chrono::Duration::seconds(2));
    }

    #[test]
    fn jitter_stays_within_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.2,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let d = policy.backoff(1).as_secs_f64();
            assert!((1.6..=2.4).contains(&d), "delay {d} out of jitter range");
        }
    }
}
