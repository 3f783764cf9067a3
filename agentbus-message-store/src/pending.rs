//! The pending-selection algorithm shared by every backend.

use agentbus_retry::RetryPolicy;
use chrono::{DateTime, Utc};

use crate::message::{Message, MessageId};

/// Select up to `limit` retry-eligible message IDs from `candidates`, in the
/// order they're handed in (backends are responsible for handing them in
/// insertion order).
///
/// A candidate is skipped if it is acked, expired, due for retry but not yet
/// at its `next_retry_time`, or already at the retry ceiling. Everything else
/// is included, stopping as soon as `limit` are collected.
pub fn select_pending<'a>(
    candidates: impl Iterator<Item = &'a Message>,
    policy: &RetryPolicy,
    limit: usize,
) -> Vec<MessageId> {
    select_pending_at(candidates, policy, limit, Utc::now())
}

fn select_pending_at<'a>(
    candidates: impl Iterator<Item = &'a Message>,
    policy: &RetryPolicy,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<MessageId> {
    let mut out = Vec::new();
    for msg in candidates {
        if limit == 0 {
            break;
        }
        if msg.is_acked() || msg.is_expired_at(now) {
            continue;
        }
        if msg.retry_count > 0 && now < policy.next_retry_time(msg) {
            continue;
        }
        if msg.retry_count >= policy.max_retries {
            continue;
        }
        out.push(msg.id);
        if out.len() >= limit {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn msg() -> Message {
        Message::new("a", "b", MessageType::Proposal, "hi")
    }

    #[test]
    fn skips_acked_and_expired() {
        let mut acked = msg();
        acked.acked_at = Some(Utc::now());
        let mut expired = msg();
        expired.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        let fresh = msg();

        let policy = RetryPolicy::default();
        let candidates = vec![acked, expired, fresh.clone()];
        let selected = select_pending(candidates.iter(), &policy, 10);
        assert_eq!(selected, vec![fresh.id]);
    }

    #[test]
    fn skips_items_not_yet_due_and_over_ceiling() {
        let policy = RetryPolicy::default();
        let mut not_due = msg();
        not_due.retry_count = 1;
        not_due.last_retry_at = Some(Utc::now());

        let mut over_ceiling = msg();
        over_ceiling.retry_count = policy.max_retries;

        let due = msg();

        let candidates = vec![not_due, over_ceiling, due.clone()];
        let selected = select_pending(candidates.iter(), &policy, 10);
        assert_eq!(selected, vec![due.id]);
    }

    #[test]
    fn stops_at_limit() {
        let policy = RetryPolicy::default();
        let candidates = vec![msg(), msg(), msg()];
        let selected = select_pending(candidates.iter(), &policy, 2);
        assert_eq!(selected.len(), 2);
    }
}
